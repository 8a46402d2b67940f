pub mod nanoid;

pub use nanoid::generate_id;
