pub mod compare;
pub mod dock;
pub mod prepare;
