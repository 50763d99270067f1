/// Named scenario catalog
use crate::core::types::{ParamType, Value};
use crate::pipeline::steps::{
    Arg, Compile, DeliverToHost, Instantiate, InvokeAndCapture, MatchOutput, MatchSourcePattern,
    ProducerContract, ReadSource, ReplaceText, ResolveMember,
};
use crate::pipeline::Pipeline;

const SCENARIOS: &[&str] = &[
    "compile",
    "test1",
    "test2",
    "test3",
    "testRoom8",
    "spawnMonster",
];

/// Texture path handed to the monster factory
pub const MONSTER_TEXTURE: &str = "character/monster/pumpkin_dude";

pub fn scenario_names() -> &'static [&'static str] {
    SCENARIOS
}

/// Build the pipeline registered under `name`.
pub fn scenario_for(name: &str) -> Option<Pipeline> {
    let pipeline = match name {
        "compile" => compile(),
        "test1" => test1(),
        "test2" => test2(),
        "test3" => test3(),
        "testRoom8" => test_room8(),
        "spawnMonster" => spawn_monster(),
        _ => return None,
    };
    Some(pipeline)
}

fn compile() -> Pipeline {
    Pipeline::new("compile").step(ReadSource).step(Compile)
}

/// Two print-to-sink methods and their expected lines
fn with_output_checks(pipeline: Pipeline) -> Pipeline {
    pipeline
        .step(
            ResolveMember::method("method1", "testExpectedOutput7", vec![ParamType::Sink])
                .with_messages("method1 ok", "method1 not ok"),
        )
        .step(
            InvokeAndCapture::new("method1", vec![Arg::Value(Value::Sink)], "invocation1")
                .with_messages("invocation1 ok", "invocation1 not ok"),
        )
        .step(MatchOutput::new("output1", "invocation1", "Die Summe ist: 7"))
        .step(
            ResolveMember::method("method2", "testExpectedOutput8", vec![ParamType::Sink])
                .with_messages("method2 ok", "method2 not ok"),
        )
        .step(
            InvokeAndCapture::new("method2", vec![Arg::Value(Value::Sink)], "invocation2")
                .with_messages("invocation2 ok", "invocation2 not ok"),
        )
        .step(MatchOutput::new("output2", "invocation2", "Die dritte Zahl ist: 8"))
}

fn test1() -> Pipeline {
    with_output_checks(Pipeline::new("test1").step(ReadSource).step(Compile))
}

fn test2() -> Pipeline {
    with_output_checks(
        Pipeline::new("test2")
            .step(ReadSource)
            .step(ReplaceText::new("10", "yuppie"))
            .step(Compile),
    )
}

fn test3() -> Pipeline {
    let pipeline = with_output_checks(
        Pipeline::new("test3")
            .step(ReadSource)
            .step(ReplaceText::new("10", "yuppie"))
            .step(Compile),
    );
    pipeline.step(MatchSourcePattern::new("try-catch", "try.+catch"))
}

fn test_room8() -> Pipeline {
    Pipeline::new("testRoom8")
        .step(ReadSource)
        .step(Compile)
        .step(
            ProducerContract::new(
                "testRoom8",
                vec![ParamType::Float, ParamType::Float, ParamType::Float],
                vec![Value::Float(10.0), Value::Float(30.0), Value::Float(20.0)],
            )
            .expect("calculateArea", 2200)
            .expect("calculatePerimeter", 240)
            .expect("calculateVolume", 6000),
        )
}

fn spawn_monster() -> Pipeline {
    Pipeline::new("spawnMonster")
        .step(ReadSource)
        .step(Compile)
        .step(
            ResolveMember::method(
                "factory",
                "spawnMonster",
                vec![ParamType::Str, ParamType::Int, ParamType::Float],
            )
            .with_messages("method ok", "method not found"),
        )
        .step(Instantiate::new(
            "factory-instance",
            vec![ParamType::named("Room")],
            vec![Arg::Host],
        ))
        .step(
            InvokeAndCapture::new(
                "factory",
                vec![
                    Arg::Value(Value::Str(MONSTER_TEXTURE.to_string())),
                    Arg::Value(Value::Int(10)),
                    Arg::Value(Value::Float(10.0)),
                ],
                "entity",
            )
            .on_instance("factory-instance")
            .expecting_value("entity")
            .with_messages("entity ok", "entity not found"),
        )
        .step(DeliverToHost::new("entity", "entity"))
}
