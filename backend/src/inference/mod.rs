pub mod features;
pub mod heuristic;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod probabilities;
pub mod report;
pub mod upload;
