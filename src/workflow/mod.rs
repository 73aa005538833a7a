//! API-format workflow handling: graph loading, input wiring and params.
pub mod graph;
pub mod params;

pub use graph::{collect_output_images, load_graph, wire_input_images, ImageRef};
pub use params::{apply_params, parse_set_pairs};
