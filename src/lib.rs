pub mod block;
pub mod config;
pub mod engine;
pub mod gate;
pub mod index;
pub mod layout;
pub mod normalize;
pub mod pdf;
pub mod query;
pub mod rank;
pub mod token;

pub use config::Config;
pub use engine::QaEngine;
pub use gate::AskResponse;
