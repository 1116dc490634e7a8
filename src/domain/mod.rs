//! Tool manual, registry and the tools exposed over HTTP

pub mod builtin;
pub mod manual;
pub mod tools;
pub mod utils;
