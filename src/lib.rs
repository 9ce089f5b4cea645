pub mod cache;
pub mod config;
pub mod daily;
pub mod monthly;
pub mod persist;
pub mod report;
pub mod roster;
pub mod trace;
pub mod validate;
pub mod youtube;

pub mod util {
    pub mod env;
}
