pub mod composite;
pub mod difference;
pub mod encode;
pub mod gaussian;
pub mod mask;
