//! Hyperspectral cubes and tiled pixel access.
//!
//! The algorithms never index a whole image directly. They pull [`Tile`]s
//! through the [`PixelSource`] trait, region by region, as laid out by a
//! [`TileLayout`]. [`HyperspectralCube`] is the in-memory source; file-backed
//! readers implement the same trait.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UnmixError};
use crate::matrix::SpectralMatrix;

/// Rectangular pixel region of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

impl Region {
    pub fn new(row: usize, col: usize, height: usize, width: usize) -> Self {
        Self {
            row,
            col,
            height,
            width,
        }
    }

    /// Number of pixels in the region.
    #[inline]
    pub fn len(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image coordinates of the `i`-th pixel, pixels ordered row-major.
    #[inline]
    pub fn coords(&self, i: usize) -> (usize, usize) {
        (self.row + i / self.width, self.col + i % self.width)
    }

    fn check_within(&self, rows: usize, cols: usize) -> Result<()> {
        if self.row + self.height > rows || self.col + self.width > cols {
            return Err(UnmixError::RegionOutOfBounds {
                row: self.row,
                col: self.col,
                height: self.height,
                width: self.width,
                rows,
                cols,
            });
        }
        Ok(())
    }
}

/// Tile size used to stream an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub tile_height: usize,
    pub tile_width: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_height: 64,
            tile_width: 64,
        }
    }
}

impl TilingConfig {
    /// Layout of this tiling over a `rows × cols` image.
    pub fn layout(&self, rows: usize, cols: usize) -> TileLayout {
        TileLayout::new(rows, cols, self.tile_height, self.tile_width)
    }
}

/// Row-major sequence of tiles covering an image; edge tiles are clipped.
#[derive(Debug, Clone)]
pub struct TileLayout {
    rows: usize,
    cols: usize,
    tile_height: usize,
    tile_width: usize,
    next_row: usize,
    next_col: usize,
}

impl TileLayout {
    /// Zero tile dimensions are treated as 1.
    pub fn new(rows: usize, cols: usize, tile_height: usize, tile_width: usize) -> Self {
        Self {
            rows,
            cols,
            tile_height: tile_height.max(1),
            tile_width: tile_width.max(1),
            next_row: 0,
            next_col: 0,
        }
    }

    /// Full-width horizontal strips of `height` rows.
    pub fn strips(rows: usize, cols: usize, height: usize) -> Self {
        Self::new(rows, cols, height, cols)
    }
}

impl Iterator for TileLayout {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        if self.next_row >= self.rows || self.cols == 0 {
            return None;
        }
        let height = self.tile_height.min(self.rows - self.next_row);
        let width = self.tile_width.min(self.cols - self.next_col);
        let region = Region::new(self.next_row, self.next_col, height, width);

        self.next_col += width;
        if self.next_col >= self.cols {
            self.next_col = 0;
            self.next_row += height;
        }
        Some(region)
    }
}

/// Pixels of one region, one spectrum per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    region: Region,
    image_cols: usize,
    pixels: SpectralMatrix,
}

impl Tile {
    /// Wrap a `bands × region.len()` pixel matrix.
    pub fn new(region: Region, image_cols: usize, pixels: SpectralMatrix) -> Result<Self> {
        if pixels.ncols() != region.len() {
            return Err(UnmixError::invalid(
                "pixels",
                format!(
                    "tile holds {} spectra for a region of {} pixels",
                    pixels.ncols(),
                    region.len()
                ),
            ));
        }
        Ok(Self {
            region,
            image_cols,
            pixels,
        })
    }

    #[inline]
    pub fn region(&self) -> Region {
        self.region
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.pixels.nrows()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.ncols()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spectrum of the `i`-th pixel of the tile.
    #[inline]
    pub fn pixel(&self, i: usize) -> &[f64] {
        self.pixels.column(i)
    }

    /// Row-major index of the `i`-th tile pixel in the whole image.
    #[inline]
    pub fn global_index(&self, i: usize) -> usize {
        let (r, c) = self.region.coords(i);
        r * self.image_cols + c
    }
}

/// Pull-based access to a tiled multi-band image.
pub trait PixelSource {
    fn rows(&self) -> usize;

    fn cols(&self) -> usize;

    /// Number of bands per pixel, identical for every pixel.
    fn bands(&self) -> usize;

    /// Copy the pixels of `region` out of the image.
    fn read_tile(&self, region: Region) -> Result<Tile>;

    fn pixel_count(&self) -> usize {
        self.rows() * self.cols()
    }
}

/// In-memory hyperspectral image.
///
/// Pixel `(r, c)` is column `r * cols + c` of a `bands × (rows * cols)`
/// [`SpectralMatrix`], i.e. band-interleaved-by-pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperspectralCube {
    rows: usize,
    cols: usize,
    pixels: SpectralMatrix,
}

impl HyperspectralCube {
    /// Zero-filled cube.
    pub fn new(rows: usize, cols: usize, bands: usize) -> Self {
        Self {
            rows,
            cols,
            pixels: SpectralMatrix::zeros(bands, rows * cols),
        }
    }

    /// Wrap a `bands × (rows * cols)` pixel matrix.
    pub fn from_pixel_matrix(pixels: SpectralMatrix, rows: usize, cols: usize) -> Result<Self> {
        if pixels.ncols() != rows * cols {
            return Err(UnmixError::invalid(
                "pixels",
                format!(
                    "{} spectra cannot fill a {}x{} image",
                    pixels.ncols(),
                    rows,
                    cols
                ),
            ));
        }
        Ok(Self { rows, cols, pixels })
    }

    /// Build from band-interleaved-by-pixel samples of any numeric type.
    ///
    /// `samples[(r * cols + c) * bands + b]` is band `b` of pixel `(r, c)`.
    pub fn from_samples<T>(samples: &[T], rows: usize, cols: usize, bands: usize) -> Result<Self>
    where
        T: Copy + Into<f64>,
    {
        let expected = rows * cols * bands;
        if samples.len() != expected {
            return Err(UnmixError::invalid(
                "samples",
                format!("expected {} samples, got {}", expected, samples.len()),
            ));
        }
        let data: Vec<f64> = samples.iter().map(|&s| s.into()).collect();
        let pixels = SpectralMatrix::from_column_major(data, bands, rows * cols)
            .ok_or_else(|| UnmixError::invalid("samples", "inconsistent dimensions"))?;
        Ok(Self { rows, cols, pixels })
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.pixels.nrows()
    }

    /// `(rows, cols, bands)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.bands())
    }

    /// Spectrum of pixel `(row, col)`.
    ///
    /// # Panics
    /// Panics if the pixel is outside the image.
    #[inline]
    pub fn pixel(&self, row: usize, col: usize) -> &[f64] {
        self.pixels.column(row * self.cols + col)
    }

    /// Overwrite pixel `(row, col)`.
    pub fn set_pixel(&mut self, row: usize, col: usize, spectrum: &[f64]) -> Result<()> {
        Region::new(row, col, 1, 1).check_within(self.rows, self.cols)?;
        if spectrum.len() != self.bands() {
            return Err(UnmixError::InputShapeMismatch {
                expected: self.bands(),
                actual: spectrum.len(),
            });
        }
        self.pixels
            .column_mut(row * self.cols + col)
            .copy_from_slice(spectrum);
        Ok(())
    }

    /// Borrow the per-pixel matrix form.
    pub fn pixel_matrix(&self) -> &SpectralMatrix {
        &self.pixels
    }

    /// Per-pixel matrix form, `bands × (rows * cols)`.
    pub fn to_pixel_matrix(&self) -> SpectralMatrix {
        self.pixels.clone()
    }

    /// Consume the cube, keeping its per-pixel matrix.
    pub fn into_pixel_matrix(self) -> SpectralMatrix {
        self.pixels
    }

    /// Copy a tile back into its region of the cube.
    pub fn write_tile(&mut self, tile: &Tile) -> Result<()> {
        let region = tile.region();
        region.check_within(self.rows, self.cols)?;
        if tile.bands() != self.bands() {
            return Err(UnmixError::InputShapeMismatch {
                expected: self.bands(),
                actual: tile.bands(),
            });
        }
        for i in 0..tile.len() {
            let (r, c) = region.coords(i);
            self.pixels
                .column_mut(r * self.cols + c)
                .copy_from_slice(tile.pixel(i));
        }
        Ok(())
    }
}

impl PixelSource for HyperspectralCube {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn bands(&self) -> usize {
        self.pixels.nrows()
    }

    fn read_tile(&self, region: Region) -> Result<Tile> {
        region.check_within(self.rows, self.cols)?;
        let bands = self.bands();
        let data = if region.width == self.cols {
            // Full-width strips are contiguous in pixel order
            let start = region.row * self.cols * bands;
            self.pixels.as_slice()[start..start + region.len() * bands].to_vec()
        } else {
            let mut data = Vec::with_capacity(region.len() * bands);
            for r in region.row..region.row + region.height {
                for c in region.col..region.col + region.width {
                    data.extend_from_slice(self.pixel(r, c));
                }
            }
            data
        };
        let pixels = SpectralMatrix::from_column_major(data, bands, region.len())
            .ok_or_else(|| UnmixError::invalid("region", "tile size mismatch"))?;
        Tile::new(region, self.cols, pixels)
    }
}

/// Read every pixel of `source` into one `bands × pixels` matrix.
pub fn collect_pixels<S>(source: &S, tiling: &TilingConfig) -> Result<SpectralMatrix>
where
    S: PixelSource + ?Sized,
{
    let bands = source.bands();
    let cols = source.cols();
    let mut all = SpectralMatrix::zeros(bands, source.pixel_count());
    for region in tiling.layout(source.rows(), cols) {
        let tile = source.read_tile(region)?;
        for i in 0..tile.len() {
            all.column_mut(tile.global_index(i))
                .copy_from_slice(tile.pixel(i));
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_cube(rows: usize, cols: usize, bands: usize) -> HyperspectralCube {
        let samples: Vec<f64> = (0..rows * cols * bands).map(|v| v as f64).collect();
        HyperspectralCube::from_samples(&samples, rows, cols, bands).unwrap()
    }

    #[test]
    fn test_tile_layout_covers_image_once() {
        let regions: Vec<Region> = TileLayout::new(5, 7, 2, 3).collect();
        let total: usize = regions.iter().map(Region::len).sum();
        assert_eq!(total, 35);
        assert_eq!(regions[0], Region::new(0, 0, 2, 3));
        assert_eq!(regions[2], Region::new(0, 6, 2, 1));
        assert_eq!(*regions.last().unwrap(), Region::new(4, 6, 1, 1));
        assert_eq!(regions.len(), 9);
    }

    #[test]
    fn test_tile_layout_empty_image() {
        assert_eq!(TileLayout::new(0, 4, 2, 2).count(), 0);
        assert_eq!(TileLayout::new(4, 0, 2, 2).count(), 0);
    }

    #[test]
    fn test_strips() {
        let regions: Vec<Region> = TileLayout::strips(5, 4, 2).collect();
        assert_eq!(regions.len(), 3);
        assert!(regions.iter().all(|r| r.width == 4));
    }

    #[test]
    fn test_from_samples_layout() {
        let cube = ramp_cube(2, 3, 4);
        assert_eq!(cube.shape(), (2, 3, 4));
        assert_eq!(cube.pixel(0, 0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(cube.pixel(1, 2), &[20.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn test_from_samples_integer_type() {
        let samples: Vec<u16> = vec![1, 2, 3, 4];
        let cube = HyperspectralCube::from_samples(&samples, 1, 2, 2).unwrap();
        assert_eq!(cube.pixel(0, 1), &[3.0, 4.0]);
        assert!(HyperspectralCube::from_samples(&samples, 2, 2, 2).is_err());
    }

    #[test]
    fn test_read_tile_matches_pixels() {
        let cube = ramp_cube(4, 5, 3);
        for region in [Region::new(1, 1, 2, 3), Region::new(2, 0, 2, 5)] {
            let tile = cube.read_tile(region).unwrap();
            assert_eq!(tile.len(), region.len());
            for i in 0..tile.len() {
                let (r, c) = region.coords(i);
                assert_eq!(tile.pixel(i), cube.pixel(r, c));
                assert_eq!(tile.global_index(i), r * 5 + c);
            }
        }
    }

    #[test]
    fn test_read_tile_out_of_bounds() {
        let cube = ramp_cube(2, 2, 1);
        let err = cube.read_tile(Region::new(1, 1, 2, 1)).unwrap_err();
        assert!(matches!(err, UnmixError::RegionOutOfBounds { .. }));
    }

    #[test]
    fn test_pixel_matrix_round_trip_is_exact() {
        let cube = ramp_cube(3, 4, 5);
        let matrix = cube.to_pixel_matrix();
        assert_eq!(matrix.shape(), (5, 12));
        let back = HyperspectralCube::from_pixel_matrix(matrix, 3, 4).unwrap();
        assert_eq!(back, cube);

        let owned = back.into_pixel_matrix();
        assert_eq!(&owned, cube.pixel_matrix());
        assert_eq!(owned.column(5), cube.pixel(1, 1));
    }

    #[test]
    fn test_from_pixel_matrix_rejects_wrong_count() {
        let matrix = SpectralMatrix::zeros(3, 5);
        assert!(HyperspectralCube::from_pixel_matrix(matrix, 2, 3).is_err());
    }

    #[test]
    fn test_write_tile() {
        let source = ramp_cube(3, 3, 2);
        let mut target = HyperspectralCube::new(3, 3, 2);
        for region in TileLayout::new(3, 3, 2, 2) {
            target.write_tile(&source.read_tile(region).unwrap()).unwrap();
        }
        assert_eq!(target, source);
    }

    #[test]
    fn test_set_pixel_checks_shape() {
        let mut cube = HyperspectralCube::new(2, 2, 3);
        cube.set_pixel(1, 0, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(cube.pixel(1, 0), &[1.0, 2.0, 3.0]);
        assert!(matches!(
            cube.set_pixel(0, 0, &[1.0]),
            Err(UnmixError::InputShapeMismatch { expected: 3, actual: 1 })
        ));
        assert!(cube.set_pixel(2, 0, &[0.0; 3]).is_err());
    }

    #[test]
    fn test_collect_pixels() {
        let cube = ramp_cube(5, 3, 2);
        let tiling = TilingConfig {
            tile_height: 2,
            tile_width: 2,
        };
        assert_eq!(collect_pixels(&cube, &tiling).unwrap(), cube.to_pixel_matrix());
    }
}
