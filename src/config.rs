use serde::{Deserialize, Serialize};

use crate::bin_packer::{DEFAULT_COLUMN_STEP, DEFAULT_ROW_STEP};
use crate::error::Result;
use crate::utils::Color;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Side of pooled atlas textures and the threshold above which images are tiled.
    /// Capped by the device limit.
    pub max_texture_size: u32,
    pub atlas_padding: u32,
    pub packer_row_step: u32,
    pub packer_column_step: u32,
    /// Smallest square, power-of-two tileable image that gets a texture to itself.
    pub exact_fit_min_size: u32,
    pub clear_color: Color,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            max_texture_size: 1024,
            atlas_padding: 1,
            packer_row_step: DEFAULT_ROW_STEP,
            packer_column_step: DEFAULT_COLUMN_STEP,
            exact_fit_min_size: 64,
            clear_color: Color::BLACK,
        }
    }
}

impl GraphicsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = GraphicsConfig::from_json_str(r#"{ "max_texture_size": 256 }"#).unwrap();
        assert_eq!(config.max_texture_size, 256);
        assert_eq!(config.atlas_padding, 1);
        assert_eq!(config.packer_row_step, 16);
        assert_eq!(config.clear_color, Color::BLACK);
    }

    #[test]
    fn json_round_trip() {
        let config = GraphicsConfig::default().with_max_texture_size(64);
        let text = config.to_json_string().unwrap();
        assert_eq!(GraphicsConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = GraphicsConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
