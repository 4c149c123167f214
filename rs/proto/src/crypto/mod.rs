#[allow(clippy::all)]
#[path = "../gen/crypto.v1.rs"]
pub mod v1;
