pub mod math;
pub mod primitive_vec;

pub use primitive_vec::{
    DoubleVec,
    FloatVec,
    IntVec,
    PrimitiveVec,
};
