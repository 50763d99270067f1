use anyhow::Result;

fn main() -> Result<()> {
    dojobox::cli::run()
}
