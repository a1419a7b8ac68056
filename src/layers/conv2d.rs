use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::layers::layer::{decode_params, encode_params, expect_rank, Layer};
use crate::math::backend::Backend;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::Optimizer;

/// 2-D convolution (cross-correlation) over `[batch, channels, height, width]`
/// inputs with square kernels, configurable stride and zero padding.
///
/// Filters are kept flat in `[out][in][kh][kw]` order, which is exactly the
/// row-major layout of the `out × (in·k·k)` matrix handed to the optimizer.
#[derive(Debug)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    filters: Vec<f64>,
    biases: Vec<f64>,
    input: Option<Tensor>,
    gradients: Option<(Vec<f64>, Vec<f64>)>,
}

#[derive(Serialize, Deserialize)]
struct Conv2dParams {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    filters: Vec<f64>,
    biases: Vec<f64>,
}

/// Spatial extent of one convolution pass.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    batch: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

impl Conv2d {
    pub const KIND: &'static str = "conv2d";

    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Conv2d> {
        Conv2d::with_rng(in_channels, out_channels, kernel_size, stride, padding, &mut rand::thread_rng())
    }

    /// He-initialised filters over fan-in `in_channels · k · k`; biases start at 0.
    pub fn with_rng<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Result<Conv2d> {
        validate_hyperparams(in_channels, out_channels, kernel_size, stride)?;
        let fan_in = in_channels * kernel_size * kernel_size;
        let filters = Matrix::he(out_channels, fan_in, rng).to_flat();
        Ok(Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            filters,
            biases: vec![0.0; out_channels],
            input: None,
            gradients: None,
        })
    }

    pub fn from_params(params: serde_json::Value) -> Result<Conv2d> {
        let mut layer = Conv2d {
            in_channels: 0,
            out_channels: 0,
            kernel_size: 0,
            stride: 1,
            padding: 0,
            filters: Vec::new(),
            biases: Vec::new(),
            input: None,
            gradients: None,
        };
        layer.set_params(params)?;
        Ok(layer)
    }

    pub fn filters(&self) -> &[f64] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut [f64] {
        &mut self.filters
    }

    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    pub fn biases_mut(&mut self) -> &mut [f64] {
        &mut self.biases
    }

    /// (dFilters, dBias) from the most recent backward pass.
    pub fn gradients(&self) -> Option<(&[f64], &[f64])> {
        self.gradients.as_ref().map(|(f, b)| (f.as_slice(), b.as_slice()))
    }

    fn fan_in(&self) -> usize {
        self.in_channels * self.kernel_size * self.kernel_size
    }

    fn filter_index(&self, o: usize, c: usize, kh: usize, kw: usize) -> usize {
        ((o * self.in_channels + c) * self.kernel_size + kh) * self.kernel_size + kw
    }

    fn spatial_out(&self, extent: usize) -> Result<usize> {
        let padded = extent + 2 * self.padding;
        if padded < self.kernel_size {
            return Err(NnError::shape("conv2d_geometry", &[padded], &[self.kernel_size]));
        }
        Ok((padded - self.kernel_size) / self.stride + 1)
    }

    fn geometry(&self, input_shape: &[usize]) -> Result<Geometry> {
        expect_rank("conv2d_forward", input_shape, 4)?;
        if input_shape[1] != self.in_channels {
            return Err(NnError::shape(
                "conv2d_forward",
                input_shape,
                &[input_shape[0], self.in_channels, input_shape[2], input_shape[3]],
            ));
        }
        Ok(Geometry {
            batch: input_shape[0],
            in_h: input_shape[2],
            in_w: input_shape[3],
            out_h: self.spatial_out(input_shape[2])?,
            out_w: self.spatial_out(input_shape[3])?,
        })
    }

    /// Calls `visit(c, kh, kw, in_index)` for every in-bounds input pixel
    /// the kernel touches at output position (b, oh, ow). Padding positions
    /// are skipped, which is the same as multiplying by zero.
    fn for_each_tap<F>(&self, g: &Geometry, b: usize, oh: usize, ow: usize, mut visit: F)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        let h_start = (oh * self.stride) as isize - self.padding as isize;
        let w_start = (ow * self.stride) as isize - self.padding as isize;
        for c in 0..self.in_channels {
            for kh in 0..self.kernel_size {
                let ih = h_start + kh as isize;
                if ih < 0 || ih >= g.in_h as isize {
                    continue;
                }
                for kw in 0..self.kernel_size {
                    let iw = w_start + kw as isize;
                    if iw < 0 || iw >= g.in_w as isize {
                        continue;
                    }
                    let in_index = ((b * self.in_channels + c) * g.in_h + ih as usize) * g.in_w + iw as usize;
                    visit(c, kh, kw, in_index);
                }
            }
        }
    }
}

fn validate_hyperparams(in_channels: usize, out_channels: usize, kernel_size: usize, stride: usize) -> Result<()> {
    if in_channels == 0 || out_channels == 0 || kernel_size == 0 || stride == 0 {
        return Err(NnError::InvalidConfig(format!(
            "conv2d needs non-zero channels, kernel and stride (in={in_channels}, out={out_channels}, k={kernel_size}, stride={stride})"
        )));
    }
    Ok(())
}

impl Layer for Conv2d {
    fn kind(&self) -> &'static str {
        Conv2d::KIND
    }

    fn forward(&mut self, _backend: &Backend, input: &Tensor, _training: bool) -> Result<Tensor> {
        let g = self.geometry(&input.shape)?;
        let mut output = Tensor::zeros(vec![g.batch, self.out_channels, g.out_h, g.out_w]);

        for b in 0..g.batch {
            for o in 0..self.out_channels {
                for oh in 0..g.out_h {
                    for ow in 0..g.out_w {
                        let mut sum = self.biases[o];
                        self.for_each_tap(&g, b, oh, ow, |c, kh, kw, in_index| {
                            sum += input.data[in_index] * self.filters[self.filter_index(o, c, kh, kw)];
                        });
                        let out_index = ((b * self.out_channels + o) * g.out_h + oh) * g.out_w + ow;
                        output.data[out_index] = sum;
                    }
                }
            }
        }

        self.input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, _backend: &Backend, output_gradient: &Tensor) -> Result<Tensor> {
        let input = self.input.as_ref().ok_or(NnError::MissingForwardCache(Conv2d::KIND))?;
        let g = self.geometry(&input.shape)?;
        let expected = [g.batch, self.out_channels, g.out_h, g.out_w];
        if output_gradient.shape != expected {
            return Err(NnError::shape("conv2d_backward", &output_gradient.shape, &expected));
        }

        let mut d_filters = vec![0.0; self.filters.len()];
        let mut d_biases = vec![0.0; self.out_channels];
        let mut d_input = Tensor::zeros(input.shape.clone());

        for b in 0..g.batch {
            for o in 0..self.out_channels {
                for oh in 0..g.out_h {
                    for ow in 0..g.out_w {
                        let out_index = ((b * self.out_channels + o) * g.out_h + oh) * g.out_w + ow;
                        let grad = output_gradient.data[out_index];
                        d_biases[o] += grad;
                        self.for_each_tap(&g, b, oh, ow, |c, kh, kw, in_index| {
                            let f = self.filter_index(o, c, kh, kw);
                            d_filters[f] += input.data[in_index] * grad;
                            d_input.data[in_index] += self.filters[f] * grad;
                        });
                    }
                }
            }
        }

        let batch = g.batch.max(1) as f64;
        d_filters.iter_mut().for_each(|v| *v /= batch);
        d_biases.iter_mut().for_each(|v| *v /= batch);

        self.gradients = Some((d_filters, d_biases));
        Ok(d_input)
    }

    fn update_params(&mut self, optimizer: &mut dyn Optimizer, layer_index: usize) -> Result<()> {
        let (d_filters, d_biases) = self.gradients.as_ref()
            .ok_or(NnError::MissingForwardCache(Conv2d::KIND))?;
        let fan_in = self.fan_in();
        let mut flat = Matrix::from_flat(self.out_channels, fan_in, &self.filters)?;
        let d_flat = Matrix::from_flat(self.out_channels, fan_in, d_filters)?;
        optimizer.update(layer_index, &mut flat, &mut self.biases, &d_flat, d_biases)?;
        self.filters = flat.to_flat();
        Ok(())
    }

    fn params(&self) -> Result<serde_json::Value> {
        encode_params(&Conv2dParams {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            kernel_size: self.kernel_size,
            stride: self.stride,
            padding: self.padding,
            filters: self.filters.clone(),
            biases: self.biases.clone(),
        })
    }

    fn set_params(&mut self, params: serde_json::Value) -> Result<()> {
        let p: Conv2dParams = decode_params(Conv2d::KIND, params)?;
        validate_hyperparams(p.in_channels, p.out_channels, p.kernel_size, p.stride)
            .map_err(|e| NnError::MalformedModel(e.to_string()))?;
        let expected = p.out_channels * p.in_channels * p.kernel_size * p.kernel_size;
        if p.filters.len() != expected || p.biases.len() != p.out_channels {
            return Err(NnError::MalformedModel(format!(
                "conv2d expects {expected} filter weights and {} biases, got {} and {}",
                p.out_channels,
                p.filters.len(),
                p.biases.len()
            )));
        }
        self.in_channels = p.in_channels;
        self.out_channels = p.out_channels;
        self.kernel_size = p.kernel_size;
        self.stride = p.stride;
        self.padding = p.padding;
        self.filters = p.filters;
        self.biases = p.biases;
        self.input = None;
        self.gradients = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let g = self.geometry(input_shape)?;
        Ok(vec![g.batch, self.out_channels, g.out_h, g.out_w])
    }

    fn parameter_count(&self) -> usize {
        self.filters.len() + self.biases.len()
    }
}
