pub mod cache;
pub mod classify;
pub mod config;
pub mod db;
pub mod markup;
pub mod model;
pub mod pipeline;
pub mod probes;
pub mod resolver;
pub mod slug;
pub mod text;
pub mod tracing;
pub mod writer;

pub mod util {
    pub mod env;
}
