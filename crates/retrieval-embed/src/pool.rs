use anyhow::Result;
use candle_core::Tensor;

/// Mean of the unmasked token states of each sequence, scaled to unit length.
///
/// `hidden` is `[batch, tokens, hidden]`, `attention_mask` is `[batch, tokens]`
/// with 1 for real tokens; the result is `[batch, hidden]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _tokens, hidden_dim) = hidden.dims3()?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    let mean = summed.broadcast_div(&counts)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.affine(1.0, 1e-12)?;
    let out = mean.broadcast_div(&norm)?;
    anyhow::ensure!(out.dims() == &[batch, hidden_dim], "pooled shape {:?} != [{batch}, {hidden_dim}]", out.dims());
    Ok(out)
}
