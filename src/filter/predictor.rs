//! TIFF and PNG predictors applied after Flate/LZW decoding

use crate::error::{PdfError, PdfResult};
use crate::pdf::{names, Dictionary};

/// Predictor parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub columns: usize,
    pub colors: usize,
    pub bits_per_component: usize,
}

impl PredictorParams {
    /// Read `/Predictor`, `/Columns`, `/Colors`, `/BitsPerComponent`.
    /// Returns `None` when no prediction is configured.
    pub fn from_dict(params: &Dictionary) -> Option<Self> {
        let predictor = params.get_i64(names::PREDICTOR)?;
        if predictor <= 1 {
            return None;
        }
        Some(Self {
            predictor: predictor.clamp(0, 255) as u8,
            columns: params.get_i64(names::COLUMNS).unwrap_or(1).max(1) as usize,
            colors: params.get_i64(names::COLORS).unwrap_or(1).max(1) as usize,
            bits_per_component: params.get_i64(names::BITS_PER_COMPONENT).unwrap_or(8).max(1) as usize,
        })
    }

    fn bytes_per_pixel(&self) -> usize {
        ((self.colors * self.bits_per_component + 7) / 8).max(1)
    }

    fn bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component + 7) / 8
    }
}

/// Undo the prediction encoded in `data`
pub fn apply_predictor(data: &[u8], params: &PredictorParams) -> PdfResult<Vec<u8>> {
    let bpp = params.bytes_per_pixel();
    let row_len = params.bytes_per_row();
    if row_len == 0 {
        return Ok(data.to_vec());
    }

    match params.predictor {
        2 => Ok(tiff_predictor(data, params, row_len)),
        10..=15 => png_predictor(data, bpp, row_len),
        other => Err(PdfError::malformed(format!("Invalid predictor {}", other))),
    }
}

fn tiff_predictor(data: &[u8], params: &PredictorParams, row_len: usize) -> Vec<u8> {
    // Only byte-aligned components are handled; other depths pass through.
    if params.bits_per_component != 8 {
        return data.to_vec();
    }
    let mut output = Vec::with_capacity(data.len());
    for row in data.chunks(row_len) {
        let start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= params.colors { output[start + i - params.colors] } else { 0 };
            output.push(byte.wrapping_add(left));
        }
    }
    output
}

fn png_predictor(data: &[u8], bpp: usize, row_len: usize) -> PdfResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];
    let mut row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let filter_type = chunk[0];
        let encoded = &chunk[1..];
        row.fill(0);
        row[..encoded.len()].copy_from_slice(encoded);

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };

            let predicted = match filter_type {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(PdfError::malformed(format!("Invalid PNG filter type {}", other)))
                }
            };
            row[i] = row[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&row[..encoded.len()]);
        prev_row.copy_from_slice(&row);
    }

    Ok(output)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn params(predictor: u8, columns: usize) -> PredictorParams {
        PredictorParams { predictor, columns, colors: 1, bits_per_component: 8 }
    }

    #[test]
    fn test_params_from_dict() {
        let mut dict = Dictionary::new();
        assert_eq!(PredictorParams::from_dict(&dict), None);
        dict.set(names::PREDICTOR, 12);
        dict.set(names::COLUMNS, 5);
        let parsed = PredictorParams::from_dict(&dict).unwrap();
        assert_eq!(parsed, params(12, 5));
    }

    #[test]
    fn test_png_up_predictor() -> PdfResult<()> {
        // two rows of three bytes, second row encoded with "Up"
        let data = [2, 1, 2, 3, 2, 1, 1, 1];
        assert_eq!(apply_predictor(&data, &params(12, 3))?, vec![1, 2, 3, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_png_sub_and_paeth() -> PdfResult<()> {
        let data = [1, 5, 1, 1, 4, 0, 0, 0];
        assert_eq!(apply_predictor(&data, &params(15, 3))?, vec![5, 6, 7, 5, 6, 7]);
        Ok(())
    }

    #[test]
    fn test_tiff_predictor() -> PdfResult<()> {
        let data = [10, 1, 1, 20, 2, 2];
        assert_eq!(apply_predictor(&data, &params(2, 3))?, vec![10, 11, 12, 20, 22, 24]);
        Ok(())
    }

    #[test]
    fn test_invalid_png_filter_type() {
        assert!(apply_predictor(&[9, 0, 0], &params(10, 2)).is_err());
    }
}
