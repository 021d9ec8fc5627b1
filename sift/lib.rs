#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod numeric;
pub mod types;

#[path = "../assemble/mod.rs"]
pub mod assemble;

#[path = "../impute/mod.rs"]
pub mod impute;

#[path = "../evaluate/mod.rs"]
pub mod evaluate;

#[path = "../model/mod.rs"]
pub mod model;

#[path = "../search/mod.rs"]
pub mod search;

#[path = "../aggregate/mod.rs"]
pub mod aggregate;

#[path = "../report/mod.rs"]
pub mod report;
