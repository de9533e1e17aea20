//! Overview generation.

/// Downsample a grid by a factor of 2 using the mean of each 2x2 block.
///
/// Output dimensions round up so edge rows/columns are kept. Cells equal to
/// `nodata` (or NaN) are ignored; a block with no valid cells becomes
/// `nodata`.
///
/// # Returns
/// Tuple of (downsampled_data, new_width, new_height)
pub fn downsample_2x_mean(
    data: &[f32],
    width: usize,
    height: usize,
    nodata: f32,
) -> (Vec<f32>, usize, usize) {
    let new_width = width.div_ceil(2);
    let new_height = height.div_ceil(2);

    let mut output = vec![nodata; new_width * new_height];

    for out_y in 0..new_height {
        for out_x in 0..new_width {
            let mut sum = 0.0f64;
            let mut count = 0u32;

            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let x = out_x * 2 + dx;
                let y = out_y * 2 + dy;
                if x >= width || y >= height {
                    continue;
                }
                let v = data[y * width + x];
                if is_valid(v, nodata) {
                    sum += f64::from(v);
                    count += 1;
                }
            }

            if count > 0 {
                output[out_y * new_width + out_x] = (sum / f64::from(count)) as f32;
            }
        }
    }

    (output, new_width, new_height)
}

#[inline]
pub(crate) fn is_valid(v: f32, nodata: f32) -> bool {
    !v.is_nan() && v != nodata
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODATA: f32 = -9999.0;

    #[test]
    fn test_mean_of_full_blocks() {
        let data = vec![
            1.0, 3.0, 10.0, 10.0, //
            5.0, 7.0, 20.0, 30.0,
        ];
        let (out, w, h) = downsample_2x_mean(&data, 4, 2, NODATA);
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, vec![4.0, 17.5]);
    }

    #[test]
    fn test_nodata_ignored() {
        let data = vec![NODATA, 4.0, f32::NAN, NODATA];
        let (out, _, _) = downsample_2x_mean(&data, 2, 2, NODATA);
        assert_eq!(out, vec![4.0]);

        let empty = vec![NODATA; 4];
        let (out, _, _) = downsample_2x_mean(&empty, 2, 2, NODATA);
        assert_eq!(out, vec![NODATA]);
    }

    #[test]
    fn test_odd_dimensions_round_up() {
        let data: Vec<f32> = (0..15).map(|v| v as f32).collect();
        let (out, w, h) = downsample_2x_mean(&data, 5, 3, NODATA);
        assert_eq!((w, h), (3, 2));
        // bottom-right cell only covers the single corner value
        assert_eq!(out[5], 14.0);
    }
}
