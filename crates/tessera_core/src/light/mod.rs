//! Light assets.

mod area;
mod env_bitmap;
mod env_const;

pub use area::AreaLight;
pub use env_bitmap::BitmapEnvironmentLight;
pub use env_const::ConstantEnvironmentLight;

use std::sync::Arc;

use tessera_math::Color;

use crate::assets::{AssetError, AssetResult, Assets};
use crate::config::ConfigNode;
use crate::emitter::Light;

/// Create a light from its asset definition.
pub fn create(ty: &str, node: &ConfigNode<'_>, assets: &Assets) -> AssetResult<Box<dyn Light>> {
    match ty {
        "area" => {
            let luminance: Color = node.child_value("luminance")?;
            let mut light = AreaLight::new(luminance);
            if let Some(testing) = node.child("testing") {
                log::warn!("Testing configuration is enabled");
                light.set_testing_area(testing.child_value("area")?);
            }
            Ok(Box::new(light))
        }
        "env.const" => {
            let luminance = node.child_value("luminance")?;
            Ok(Box::new(ConstantEnvironmentLight::new(luminance)))
        }
        "env.bitmap" => {
            let Some(id) = node.reference("texture")? else {
                log::error!("Missing 'texture' element");
                return Err(AssetError::Invalid {
                    kind: "light",
                    message: "env.bitmap requires a 'texture' reference".to_string(),
                });
            };
            let texture = Arc::clone(assets.textures.resolve(id)?);
            let rotate: f32 = node.child_value_or_default("rotate", 0.0)?;
            Ok(Box::new(BitmapEnvironmentLight::new(texture, rotate)))
        }
        _ => Err(AssetError::UnknownType {
            kind: "light",
            ty: ty.to_string(),
        }),
    }
}
