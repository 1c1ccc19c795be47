pub mod crop;
pub mod pacer;
