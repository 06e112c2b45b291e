/// Small shared helpers
pub mod normalize;
