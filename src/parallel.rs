//! Tile- and pixel-parallel iteration behind the `parallel` feature.
//!
//! With `parallel` enabled (the default) the macros expand to rayon parallel
//! iterators; without it they fall back to sequential iteration. Every caller
//! collects per-tile partial results in tile order and combines them
//! sequentially, so both expansions produce identical output.

/// Conditionally parallel iteration over an owned collection or range.
///
/// ```ignore
/// let partials: Vec<_> = iter_maybe_parallel!(regions)
///     .map(|region| scan_tile(region))
///     .collect();
/// ```
#[macro_export]
macro_rules! iter_maybe_parallel {
    ($expr:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::iter::IntoParallelIterator;

            IntoParallelIterator::into_par_iter($expr)
        }
        #[cfg(not(feature = "parallel"))]
        {
            IntoIterator::into_iter($expr)
        }
    }};
}

/// Enumerated parallel/sequential mutable chunks, one chunk per output pixel.
///
/// ```ignore
/// maybe_par_chunks_mut_enumerate!(abundances, p, |(pixel, out)| {
///     out.copy_from_slice(&solve(pixel));
/// });
/// ```
#[macro_export]
macro_rules! maybe_par_chunks_mut_enumerate {
    ($slice:expr, $chunk_size:expr, $closure:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            $slice
                .par_chunks_mut($chunk_size)
                .enumerate()
                .for_each($closure);
        }
        #[cfg(not(feature = "parallel"))]
        {
            $slice
                .chunks_mut($chunk_size)
                .enumerate()
                .for_each($closure);
        }
    }};
}

pub use iter_maybe_parallel;
pub use maybe_par_chunks_mut_enumerate;

#[cfg(test)]
mod tests {
    #[cfg(feature = "parallel")]
    use rayon::iter::ParallelIterator;

    #[test]
    fn test_iter_maybe_parallel_preserves_order() {
        let squares: Vec<usize> = iter_maybe_parallel!(0..100usize).map(|i| i * i).collect();
        assert_eq!(squares.len(), 100);
        assert_eq!(squares[7], 49);
        assert_eq!(squares[99], 9801);
    }

    #[test]
    fn test_chunks_enumerate_visits_every_chunk() {
        let mut data = vec![0.0; 12];
        maybe_par_chunks_mut_enumerate!(data, 3, |(idx, chunk): (usize, &mut [f64])| {
            for v in chunk.iter_mut() {
                *v = idx as f64;
            }
        });
        assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
    }
}
