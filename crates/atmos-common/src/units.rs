//! Brightness temperature unit handling.
//!
//! Artifacts are stored in Kelvin; display styles convert values and the
//! fixed rescale range together so legends stay consistent.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CommonError;

const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureStyle {
    #[default]
    Kelvin,
    Celsius,
    Fahrenheit,
}

impl TemperatureStyle {
    pub fn convert(&self, kelvin: f64) -> f64 {
        match self {
            TemperatureStyle::Kelvin => kelvin,
            TemperatureStyle::Celsius => kelvin_to_celsius(kelvin),
            TemperatureStyle::Fahrenheit => kelvin_to_fahrenheit(kelvin),
        }
    }

    /// Convert a `[min, max]` rescale range expressed in Kelvin.
    pub fn convert_range(&self, range: [f64; 2]) -> [f64; 2] {
        [self.convert(range[0]), self.convert(range[1])]
    }

    pub fn units(&self) -> &'static str {
        match self {
            TemperatureStyle::Kelvin => "K",
            TemperatureStyle::Celsius => "°C",
            TemperatureStyle::Fahrenheit => "°F",
        }
    }
}

impl FromStr for TemperatureStyle {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "kelvin" | "k" => Ok(TemperatureStyle::Kelvin),
            "celsius" | "c" => Ok(TemperatureStyle::Celsius),
            "fahrenheit" | "f" => Ok(TemperatureStyle::Fahrenheit),
            _ => Err(CommonError::UnknownStyle(s.to_string())),
        }
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0
}
