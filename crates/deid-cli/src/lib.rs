//! Library half of the `deid` binary, split out so runs can be driven from tests.

pub mod cli;
pub mod run;
