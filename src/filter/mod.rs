//! Stream filter decoding
//!
//! Decoding runs the `/Filter` chain of a stream dictionary in order, each
//! stage writing into a [`BoundedBuffer`] so that hostile streams cannot
//! inflate past the configured ceiling. Image codecs (DCT, JPX, JBIG2,
//! CCITT) and `Crypt` are passed through untouched.

mod bounded;
mod codecs;
mod predictor;
pub mod strategy;

use std::io;
use flate2::read::ZlibDecoder;
use log::{trace, warn};
use crate::config::{ReaderProperties, DEFAULT_MAX_STREAM_SIZE};
use crate::error::{PdfError, PdfResult};
use crate::pdf::{names, Dictionary, Name, Value};

pub use bounded::BoundedBuffer;
pub use predictor::{apply_predictor, PredictorParams};
pub use strategy::{
    encode_with, Ascii85Strategy, AsciiHexStrategy, CompressionStrategy, EncodingSink,
    FlateStrategy, RunLengthStrategy, StreamContext,
};

/// PDF stream filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    ASCII85Decode,
    ASCIIHexDecode,
    FlateDecode,
    LZWDecode,
    RunLengthDecode,
    /// Image or crypt filter whose bytes are handed on as they are
    Passthrough(Name),
}

/// Filter processing context
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub predictor: Option<PredictorParams>,
    /// LZW code width switches one code early (PDF default)
    pub early_change: bool,
    /// Ceiling for the decoded output
    pub max_output: usize,
    /// Treat truncated compressed data as an error
    pub strict: bool,
}

impl Default for FilterContext {
    fn default() -> Self {
        Self {
            predictor: None,
            early_change: true,
            max_output: DEFAULT_MAX_STREAM_SIZE,
            strict: false,
        }
    }
}

impl FilterContext {
    /// Context for one filter stage with its `/DecodeParms` entry
    pub fn for_params(params: Option<&Dictionary>, limits: &DecodeLimits) -> Self {
        let mut ctx = Self {
            max_output: limits.max_output,
            strict: limits.strict,
            ..Self::default()
        };
        if let Some(params) = params {
            ctx.predictor = PredictorParams::from_dict(params);
            ctx.early_change = params.get_i64(names::EARLY_CHANGE).unwrap_or(1) != 0;
        }
        ctx
    }
}

/// Limits applied to a whole decode chain
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_output: usize,
    pub strict: bool,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_output: DEFAULT_MAX_STREAM_SIZE,
            strict: false,
        }
    }
}

impl From<&ReaderProperties> for DecodeLimits {
    fn from(props: &ReaderProperties) -> Self {
        Self {
            max_output: props.max_stream_size,
            strict: props.strict,
        }
    }
}

impl Filter {
    /// Create filter from name, including the abbreviated inline-image names
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "DCTDecode" | "DCT" | "JPXDecode" | "JBIG2Decode" | "CCITTFaxDecode" | "CCF" | "Crypt" => {
                Some(Filter::Passthrough(Name::new(name)))
            }
            _ => None,
        }
    }
}

/// Filter names and matching decode parameters of a stream dictionary.
///
/// `/DecodeParms` may be a single dictionary or an array aligned with the
/// filter array; nulls and references read as "no parameters".
pub fn filter_chain(dict: &Dictionary) -> Vec<(Name, Option<Dictionary>)> {
    let filters: Vec<Name> = match dict.get(names::FILTER) {
        Some(Value::Name(name)) => vec![name.clone()],
        Some(Value::Array(array)) => array.iter().filter_map(Value::as_name).cloned().collect(),
        Some(other) => {
            warn!("Invalid /Filter entry of type {}", other.type_name());
            Vec::new()
        }
        None => Vec::new(),
    };

    let params: Vec<Option<Dictionary>> = match dict.get(names::DECODE_PARMS) {
        Some(Value::Dictionary(params)) => vec![Some(params.clone())],
        Some(Value::Array(array)) => array.iter().map(|v| v.as_dict().cloned()).collect(),
        _ => Vec::new(),
    };

    filters
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, params.get(i).cloned().flatten()))
        .collect()
}

/// Decode `data` through the filter chain of `dict`
pub fn decode_bytes(data: &[u8], dict: &Dictionary, limits: &DecodeLimits) -> PdfResult<Vec<u8>> {
    let mut current = data.to_vec();
    for (name, params) in filter_chain(dict) {
        match Filter::from_name(name.as_str()) {
            Some(Filter::Passthrough(name)) => {
                trace!("Leaving {} data undecoded", name);
                break;
            }
            Some(filter) => {
                trace!("Applying filter: {:?}", filter);
                let ctx = FilterContext::for_params(params.as_ref(), limits);
                current = decode_with_filter(&filter, &current, &ctx)?;
            }
            None if limits.strict => return Err(PdfError::UnsupportedFilter(name.as_str().to_string())),
            None => {
                warn!("Unsupported filter {}, passing data through", name);
                break;
            }
        }
    }
    Ok(current)
}

/// Decode data using one filter
pub fn decode_with_filter(filter: &Filter, data: &[u8], ctx: &FilterContext) -> PdfResult<Vec<u8>> {
    let mut output = BoundedBuffer::new(ctx.max_output);
    match filter {
        Filter::ASCII85Decode => codecs::decode_ascii85(data, &mut output)?,
        Filter::ASCIIHexDecode => codecs::decode_ascii_hex(data, &mut output)?,
        Filter::RunLengthDecode => codecs::decode_run_length(data, &mut output)?,
        Filter::FlateDecode => decode_flate(data, ctx, &mut output)?,
        Filter::LZWDecode => decode_lzw(data, ctx, &mut output)?,
        Filter::Passthrough(_) => output.try_extend(data)?,
    }

    match &ctx.predictor {
        Some(predictor) if matches!(filter, Filter::FlateDecode | Filter::LZWDecode) => {
            apply_predictor(output.as_slice(), predictor)
        }
        _ => Ok(output.into_inner()),
    }
}

fn decode_flate(data: &[u8], ctx: &FilterContext, output: &mut BoundedBuffer) -> PdfResult<()> {
    let mut decoder = ZlibDecoder::new(data);
    match io::copy(&mut decoder, output) {
        Ok(_) => Ok(()),
        Err(err) => tolerate_truncation(PdfError::from_io(err), ctx, output.len()),
    }
}

fn decode_lzw(data: &[u8], ctx: &FilterContext, output: &mut BoundedBuffer) -> PdfResult<()> {
    let mut decoder = if ctx.early_change {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    let result = decoder.into_stream(&mut *output).decode_all(data);
    match result.status {
        Ok(()) => Ok(()),
        Err(err) => tolerate_truncation(PdfError::from_io(err), ctx, output.len()),
    }
}

/// Damaged compressed data keeps whatever was decoded so far, unless the
/// reader is strict. Memory limit failures are never tolerated.
fn tolerate_truncation(err: PdfError, ctx: &FilterContext, decoded: usize) -> PdfResult<()> {
    if err.is_resource_exhaustion() || ctx.strict {
        return Err(match err {
            PdfError::Io(io_err) => PdfError::Compression(io_err.to_string()),
            other => other,
        });
    }
    warn!("Compressed data is damaged, keeping {} decoded bytes: {}", decoded, err);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::write::ZlibEncoder;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_filter_chain_alignment() {
        let mut dict = Dictionary::new();
        dict.set(names::FILTER, vec![Value::from(names::ASCII_HEX_DECODE), Value::from(names::FLATE_DECODE)]);
        let mut params = Dictionary::new();
        params.set(names::PREDICTOR, 12);
        dict.set(names::DECODE_PARMS, vec![Value::Null, Value::from(params.clone())]);

        let chain = filter_chain(&dict);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], (Name::new(names::ASCII_HEX_DECODE), None));
        assert_eq!(chain[1], (Name::new(names::FLATE_DECODE), Some(params)));
    }

    #[test]
    fn test_decode_chain_in_order() -> PdfResult<()> {
        let compressed = deflate(b"chained content");
        let hex_of_compressed = format!("{}>", hex::encode(&compressed));

        let mut dict = Dictionary::new();
        dict.set(names::FILTER, vec![Value::from(names::ASCII_HEX_DECODE), Value::from(names::FLATE_DECODE)]);
        let decoded = decode_bytes(hex_of_compressed.as_bytes(), &dict, &DecodeLimits::default())?;
        assert_eq!(decoded, b"chained content");
        Ok(())
    }

    #[test]
    fn test_image_filters_pass_through() -> PdfResult<()> {
        let mut dict = Dictionary::new();
        dict.set(names::FILTER, names::DCT_DECODE);
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        assert_eq!(decode_bytes(&jpeg, &dict, &DecodeLimits::default())?, jpeg.to_vec());
        Ok(())
    }

    #[test]
    fn test_unknown_filter_strictness() {
        let mut dict = Dictionary::new();
        dict.set(names::FILTER, "Mystery");
        assert!(decode_bytes(b"abc", &dict, &DecodeLimits::default()).is_ok());

        let strict = DecodeLimits { strict: true, ..DecodeLimits::default() };
        assert!(matches!(
            decode_bytes(b"abc", &dict, &strict),
            Err(PdfError::UnsupportedFilter(ref name)) if name == "Mystery"
        ));
    }

    #[test]
    fn test_flate_bomb_hits_ceiling() {
        let bomb = deflate(&vec![0u8; 1 << 20]);
        let ctx = FilterContext { max_output: 4096, ..FilterContext::default() };
        let err = decode_with_filter(&Filter::FlateDecode, &bomb, &ctx).unwrap_err();
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_truncated_flate_is_tolerated() -> PdfResult<()> {
        let data = b"0123456789".repeat(200);
        let compressed = deflate(&data);
        let truncated = &compressed[..compressed.len() - 6];

        let lenient = decode_with_filter(&Filter::FlateDecode, truncated, &FilterContext::default())?;
        assert!(data.starts_with(&lenient));

        let strict = FilterContext { strict: true, ..FilterContext::default() };
        assert!(decode_with_filter(&Filter::FlateDecode, truncated, &strict).is_err());
        Ok(())
    }

    #[test]
    fn test_lzw_roundtrip_through_weezl() -> PdfResult<()> {
        let data = b"-----A---B".repeat(10);
        let mut encoder = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
        let encoded = encoder.encode(&data).unwrap();
        let decoded = decode_with_filter(&Filter::LZWDecode, &encoded, &FilterContext::default())?;
        assert_eq!(decoded, data);
        Ok(())
    }

    #[test]
    fn test_flate_with_png_predictor() -> PdfResult<()> {
        let rows = [2u8, 1, 2, 3, 2, 1, 1, 1];
        let compressed = deflate(&rows);
        let mut params = Dictionary::new();
        params.set(names::PREDICTOR, 12);
        params.set(names::COLUMNS, 3);
        let ctx = FilterContext::for_params(Some(&params), &DecodeLimits::default());
        assert_eq!(decode_with_filter(&Filter::FlateDecode, &compressed, &ctx)?, vec![1, 2, 3, 2, 3, 4]);
        Ok(())
    }
}
