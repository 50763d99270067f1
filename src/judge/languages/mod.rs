pub mod java;
pub mod native;
