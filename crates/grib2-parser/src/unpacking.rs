//! Simple packing (data representation template 5.0).
//!
//! `value = (R + packed * 2^E) * 10^-D`, values MSB-first at a fixed width.

use crate::error::{Grib2Error, Grib2Result};

/// Section 5 with template 5.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePacking {
    pub num_points: usize,
    pub reference_value: f32,
    pub binary_scale: i16,
    pub decimal_scale: i16,
    pub bits_per_value: u8,
}

impl SimplePacking {
    pub fn parse(section: &[u8]) -> Grib2Result<Self> {
        if section.len() < 20 {
            return Err(Grib2Error::InvalidSection {
                section: 5,
                reason: format!("{} bytes is too short for template 5.0", section.len()),
            });
        }
        let i16_at = |o: usize| {
            let raw = u16::from_be_bytes([section[o], section[o + 1]]);
            let magnitude = (raw & 0x7FFF) as i16;
            if raw & 0x8000 != 0 {
                -magnitude
            } else {
                magnitude
            }
        };
        Ok(Self {
            num_points: u32::from_be_bytes([section[5], section[6], section[7], section[8]])
                as usize,
            reference_value: f32::from_be_bytes([
                section[11],
                section[12],
                section[13],
                section[14],
            ]),
            binary_scale: i16_at(15),
            decimal_scale: i16_at(17),
            bits_per_value: section[19],
        })
    }

    /// Unpack `num_points` values; points cleared in `bitmap` become NaN.
    pub fn unpack(&self, data: &[u8], bitmap: Option<&[u8]>) -> Grib2Result<Vec<f32>> {
        let bits = self.bits_per_value as usize;
        if bits > 32 {
            return Err(Grib2Error::Unpacking(format!("{} bits per value", bits)));
        }
        let binary = 2.0_f64.powi(self.binary_scale as i32);
        let decimal = 10.0_f64.powi(-(self.decimal_scale as i32));
        let reference = self.reference_value as f64;

        let present = |i: usize| match bitmap {
            Some(bm) => bm.get(i / 8).is_some_and(|b| (b >> (7 - i % 8)) & 1 == 1),
            None => true,
        };

        let mut values = Vec::with_capacity(self.num_points);
        let mut bit_position = 0;
        for i in 0..self.num_points {
            if !present(i) {
                values.push(f32::NAN);
                continue;
            }
            let packed = if bits == 0 {
                0
            } else {
                extract_bits(data, bit_position, bits)?
            };
            bit_position += bits;
            values.push(((reference + packed as f64 * binary) * decimal) as f32);
        }
        Ok(values)
    }
}

fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Grib2Result<u32> {
    let mut result = 0u32;
    for i in 0..num_bits {
        let bit = start_bit + i;
        let byte = data.get(bit / 8).ok_or_else(|| {
            Grib2Error::Unpacking(format!("data section ends before bit {}", bit))
        })?;
        result = (result << 1) | ((byte >> (7 - bit % 8)) & 1) as u32;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bits() {
        let data = [0b1011_0101];
        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b1011_0101);
        assert!(extract_bits(&data, 4, 8).is_err());
    }

    #[test]
    fn test_unpack_with_negative_binary_scale() {
        let packing = SimplePacking {
            num_points: 2,
            reference_value: -30.0,
            binary_scale: -1,
            decimal_scale: 0,
            bits_per_value: 8,
        };
        let values = packing.unpack(&[0, 100], None).unwrap();
        assert_eq!(values, vec![-30.0, 20.0]);
    }

    #[test]
    fn test_bitmap_masks_points() {
        let packing = SimplePacking {
            num_points: 3,
            reference_value: 1.0,
            binary_scale: 0,
            decimal_scale: 0,
            bits_per_value: 8,
        };
        // Only present points consume packed values
        let values = packing.unpack(&[4, 9], Some(&[0b1010_0000])).unwrap();
        assert_eq!(values[0], 5.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 10.0);
    }

    #[test]
    fn test_constant_field() {
        let packing = SimplePacking {
            num_points: 4,
            reference_value: 12.5,
            binary_scale: 0,
            decimal_scale: 0,
            bits_per_value: 0,
        };
        assert_eq!(packing.unpack(&[], None).unwrap(), vec![12.5; 4]);
    }

    #[test]
    fn test_parse_sign_magnitude_scales() {
        let mut section = vec![0, 0, 0, 21, 5, 0, 0, 0, 4, 0, 0];
        section.extend_from_slice(&(-30.0f32).to_be_bytes());
        section.extend_from_slice(&[0x80, 0x03, 0x00, 0x01, 16, 0]);
        let packing = SimplePacking::parse(&section).unwrap();
        assert_eq!(packing.num_points, 4);
        assert_eq!(packing.reference_value, -30.0);
        assert_eq!(packing.binary_scale, -3);
        assert_eq!(packing.decimal_scale, 1);
        assert_eq!(packing.bits_per_value, 16);
    }
}
