// convolution.rs — Separable Gaussian blur for Image<T>.
//
// Only the median-flow tracker needs blurring: each pyramid level is the
// previous one blurred then decimated. A separable kernel K = k * k^T turns
// the 2D convolution into a row pass and a column pass, O(2k) per pixel.
//
// BORDER HANDLING: clamp (replicate edge pixels).

use crate::image::{Image, Pixel};

/// Generate a normalized 1D Gaussian kernel of length `2 * half_size + 1`.
///
/// # Examples
/// ```
/// let k = tld_tracker::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..2 * half_size + 1)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Blur with the same symmetric kernel along rows then columns.
///
/// Output is always f32; accumulation happens in f32 regardless of `T`.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_separable<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
    let half = (kernel.len() / 2) as isize;
    let w = src.width();
    let h = src.height();
    if w == 0 || h == 0 {
        return Image::new(w, h);
    }

    let rows = Image::from_fn(w, h, |x, y| {
        kernel.iter().enumerate().fold(0.0f32, |acc, (ki, &kv)| {
            let sx = (x as isize + ki as isize - half).clamp(0, w as isize - 1) as usize;
            acc + src.get(sx, y).to_f32() * kv
        })
    });

    Image::from_fn(w, h, |x, y| {
        kernel.iter().enumerate().fold(0.0f32, |acc, (ki, &kv)| {
            let sy = (y as isize + ki as isize - half).clamp(0, h as isize - 1) as usize;
            acc + rows.get(x, sy) * kv
        })
    })
}
