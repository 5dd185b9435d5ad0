pub mod components;
pub mod lights;
pub mod transform;

pub use components::{DirectionalLight, PointLight, SpotLight, TransformComponent};
pub use transform::Transform;
