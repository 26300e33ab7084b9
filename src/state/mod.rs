pub mod annotations;
pub mod codec;
pub mod session;
