//! COG assembly: tiling, overviews and file layout.

use std::io::Write;

use atmos_common::BoundingBox;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{CogError, CogResult};
use crate::overview::downsample_2x_mean;
use crate::tiff::*;

/// Minimum tile count to benefit from parallel compression
const PARALLEL_THRESHOLD: usize = 4;

/// GeoKey directory for geographic WGS84, pixel-is-area.
const GEO_KEYS_EPSG_4326: [u16; 16] = [
    1, 1, 0, 3, // version, revision, minor, key count
    1024, 0, 1, 2, // GTModelTypeGeoKey = ModelTypeGeographic
    1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
    2048, 0, 1, 4326, // GeographicTypeGeoKey = EPSG:4326
];

/// Writer options.
#[derive(Debug, Clone, PartialEq)]
pub struct CogOptions {
    /// Square tile edge in pixels (multiple of 16)
    pub tile_size: usize,
    /// Overview decimation factors, each a power of two
    pub overview_factors: Vec<usize>,
    /// zlib level 0-9
    pub compression_level: u32,
}

impl Default for CogOptions {
    fn default() -> Self {
        Self {
            tile_size: 256,
            overview_factors: vec![2, 4, 8, 16],
            compression_level: 6,
        }
    }
}

/// A north-up float32 raster: row 0 is the northern edge of `bounds`.
#[derive(Debug, Clone, Copy)]
pub struct GeoRaster<'a> {
    pub data: &'a [f32],
    pub width: usize,
    pub height: usize,
    pub bounds: BoundingBox,
    pub nodata: f32,
}

impl GeoRaster<'_> {
    fn validate(&self) -> CogResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CogError::InvalidRaster("raster has zero size".to_string()));
        }
        if self.data.len() != self.width * self.height {
            return Err(CogError::InvalidRaster(format!(
                "{} values for shape {}x{}",
                self.data.len(),
                self.height,
                self.width
            )));
        }
        if !self.bounds.is_valid() {
            return Err(CogError::InvalidRaster(format!(
                "degenerate bounds {:?}",
                self.bounds
            )));
        }
        Ok(())
    }
}

struct Level {
    width: usize,
    height: usize,
    tiles: Vec<Vec<u8>>,
}

/// Encode a raster as a cloud-optimized GeoTIFF.
pub fn write_cog(raster: &GeoRaster<'_>, options: &CogOptions) -> CogResult<Vec<u8>> {
    raster.validate()?;
    if options.tile_size == 0 || options.tile_size % 16 != 0 {
        return Err(CogError::InvalidRaster(format!(
            "tile size {} is not a positive multiple of 16",
            options.tile_size
        )));
    }

    // Full resolution first, then each overview built from the previous level
    let mut levels = vec![encode_level(raster.data, raster.width, raster.height, raster.nodata, options)?];
    let mut current = (raster.data.to_vec(), raster.width, raster.height);
    let mut factor = 1;
    for &target in &options.overview_factors {
        if !target.is_power_of_two() || target <= factor {
            return Err(CogError::InvalidRaster(format!(
                "overview factor {} must be an increasing power of two",
                target
            )));
        }
        while factor < target {
            current = downsample_2x_mean(&current.0, current.1, current.2, raster.nodata);
            factor *= 2;
        }
        levels.push(encode_level(&current.0, current.1, current.2, raster.nodata, options)?);
    }

    let nodata_text = format_nodata(raster.nodata);
    let ifds: Vec<Ifd> = levels
        .iter()
        .enumerate()
        .map(|(i, level)| build_ifd(raster, level, i == 0, &nodata_text, options, &[]))
        .collect();

    // Layout: header, IFDs, then tile data from the smallest overview up
    let mut ifd_offsets = Vec::with_capacity(ifds.len());
    let mut cursor = HEADER_LEN;
    for ifd in &ifds {
        ifd_offsets.push(cursor);
        cursor += ifd.encoded_len();
        cursor += cursor % 2;
    }

    let mut tile_offsets: Vec<Vec<u32>> = vec![Vec::new(); levels.len()];
    for (i, level) in levels.iter().enumerate().rev() {
        for tile in &level.tiles {
            tile_offsets[i].push(u32::try_from(cursor).map_err(|_| CogError::TooLarge)?);
            cursor += tile.len();
        }
    }
    u32::try_from(cursor).map_err(|_| CogError::TooLarge)?;

    let mut out = Vec::with_capacity(cursor);
    write_header(&mut out, HEADER_LEN as u32);
    for (i, level) in levels.iter().enumerate() {
        let ifd = build_ifd(raster, level, i == 0, &nodata_text, options, &tile_offsets[i]);
        let next = ifd_offsets.get(i + 1).copied().unwrap_or(0) as u32;
        ifd.write(&mut out, ifd_offsets[i], next);
        if out.len() % 2 == 1 {
            out.push(0);
        }
    }
    for level in levels.iter().rev() {
        for tile in &level.tiles {
            out.extend_from_slice(tile);
        }
    }

    debug!(
        width = raster.width,
        height = raster.height,
        overviews = levels.len() - 1,
        bytes = out.len(),
        "Encoded COG"
    );

    Ok(out)
}

fn build_ifd(
    raster: &GeoRaster<'_>,
    level: &Level,
    full_resolution: bool,
    nodata_text: &str,
    options: &CogOptions,
    tile_offsets: &[u32],
) -> Ifd {
    let mut ifd = Ifd::default();
    let offsets = if tile_offsets.is_empty() {
        vec![0; level.tiles.len()]
    } else {
        tile_offsets.to_vec()
    };

    ifd.set(TAG_NEW_SUBFILE_TYPE, Value::Long(vec![u32::from(!full_resolution)]));
    ifd.set(TAG_IMAGE_WIDTH, Value::Long(vec![level.width as u32]));
    ifd.set(TAG_IMAGE_LENGTH, Value::Long(vec![level.height as u32]));
    ifd.set(TAG_BITS_PER_SAMPLE, Value::Short(vec![32]));
    ifd.set(TAG_COMPRESSION, Value::Short(vec![COMPRESSION_DEFLATE]));
    ifd.set(TAG_PHOTOMETRIC, Value::Short(vec![PHOTOMETRIC_MIN_IS_BLACK]));
    ifd.set(TAG_SAMPLES_PER_PIXEL, Value::Short(vec![1]));
    ifd.set(TAG_PLANAR_CONFIG, Value::Short(vec![1]));
    ifd.set(TAG_TILE_WIDTH, Value::Long(vec![options.tile_size as u32]));
    ifd.set(TAG_TILE_LENGTH, Value::Long(vec![options.tile_size as u32]));
    ifd.set(TAG_TILE_OFFSETS, Value::Long(offsets));
    ifd.set(
        TAG_TILE_BYTE_COUNTS,
        Value::Long(level.tiles.iter().map(|t| t.len() as u32).collect()),
    );
    ifd.set(TAG_SAMPLE_FORMAT, Value::Short(vec![SAMPLE_FORMAT_IEEE_FLOAT]));
    ifd.set(TAG_GDAL_NODATA, Value::Ascii(nodata_text.to_string()));

    if full_resolution {
        let b = raster.bounds;
        ifd.set(
            TAG_MODEL_PIXEL_SCALE,
            Value::Double(vec![
                b.width() / raster.width as f64,
                b.height() / raster.height as f64,
                0.0,
            ]),
        );
        ifd.set(
            TAG_MODEL_TIEPOINT,
            Value::Double(vec![0.0, 0.0, 0.0, b.west, b.north, 0.0]),
        );
        ifd.set(TAG_GEO_KEY_DIRECTORY, Value::Short(GEO_KEYS_EPSG_4326.to_vec()));
    }

    ifd
}

/// Split a level into row-major tiles and deflate each one.
fn encode_level(
    data: &[f32],
    width: usize,
    height: usize,
    nodata: f32,
    options: &CogOptions,
) -> CogResult<Level> {
    let ts = options.tile_size;
    let tiles_across = width.div_ceil(ts);
    let tiles_down = height.div_ceil(ts);
    let count = tiles_across * tiles_down;

    let encode = |index: usize| -> CogResult<Vec<u8>> {
        let tx = index % tiles_across;
        let ty = index / tiles_across;
        let mut raw = Vec::with_capacity(ts * ts * 4);
        for row in 0..ts {
            let y = ty * ts + row;
            for col in 0..ts {
                let x = tx * ts + col;
                // Edge tiles are padded with nodata
                let v = if x < width && y < height {
                    data[y * width + x]
                } else {
                    nodata
                };
                raw.extend_from_slice(&v.to_le_bytes());
            }
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(options.compression_level));
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    };

    let tiles = if count >= PARALLEL_THRESHOLD {
        (0..count).into_par_iter().map(encode).collect::<CogResult<Vec<_>>>()?
    } else {
        (0..count).map(encode).collect::<CogResult<Vec<_>>>()?
    };

    Ok(Level {
        width,
        height,
        tiles,
    })
}

fn format_nodata(nodata: f32) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}
