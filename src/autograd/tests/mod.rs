//! Autograd engine tests: gradient checks and graph-ordering behavior

mod prop_norm;
mod test_utils;
mod unit_graph;
