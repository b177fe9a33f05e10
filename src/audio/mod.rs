pub mod descriptor;
pub mod negotiator;
pub mod toolchain;
