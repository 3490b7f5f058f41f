pub mod color;
pub mod flamechart;
pub mod input;
pub mod model;
pub mod parsers;
pub mod renderer;
pub mod search;
pub mod task;
pub mod viewport;
