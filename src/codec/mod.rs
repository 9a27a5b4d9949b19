pub mod value;

pub use value::{read_value, write_value};
