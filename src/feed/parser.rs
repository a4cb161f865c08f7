//! Venue JSON → typed records.
//!
//! Stateless and thread-safe: every function takes the raw text and returns
//! a typed record or a [`ParseError`]. A malformed frame is dropped by the
//! caller and logged, never panicked on.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::{FixedParseError, FixedPrice};
use crate::feed::endpoints::{is_agg_trade_stream, is_depth_stream};
use crate::feed::messages::{AggTrade, DepthSnapshot, DepthUpdate, PriceLevel};

/// Parse failures. `Json` covers both malformed JSON and missing required
/// fields (serde rejects an absent non-optional field).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad price string: {0}")]
    Price(#[from] FixedParseError),
    #[error("bad quantity string: {0}")]
    Quantity(#[from] std::num::ParseFloatError),
}

/// Classified payload of one combined-stream frame.
#[derive(Debug)]
pub enum StreamPayload {
    Depth(DepthUpdate),
    Trade(AggTrade),
    /// Streams this engine does not subscribe to; dropped by the caller.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawStreamFrame {
    stream: String,
    data: Value,
}

// Raw wire shapes. The one-letter names are the venue's; non-Option fields
// double as the required-field check.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawDepthUpdate {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "pu")]
    prev_final_update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawAggTrade {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "a")]
    agg_trade_id: u64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "f")]
    first_trade_id: u64,
    #[serde(rename = "l")]
    last_trade_id: u64,
    #[serde(rename = "T")]
    trade_time: u64,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
}

#[derive(Debug, Deserialize)]
struct RawDepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

/// Price levels come as `["price", "qty"]` string pairs. Prices go through
/// the fixed-point parser so equal decimals land on equal book keys.
fn parse_levels(raw: Vec<[String; 2]>) -> Result<Vec<PriceLevel>, ParseError> {
    let mut levels = Vec::with_capacity(raw.len());
    for [price, qty] in raw {
        levels.push(PriceLevel {
            price: FixedPrice::parse(&price)?,
            qty: qty.parse::<f64>()?,
        });
    }
    Ok(levels)
}

fn convert_depth_update(raw: RawDepthUpdate) -> Result<DepthUpdate, ParseError> {
    Ok(DepthUpdate {
        event_time: raw.event_time,
        symbol: raw.symbol,
        first_update_id: raw.first_update_id,
        final_update_id: raw.final_update_id,
        prev_final_update_id: raw.prev_final_update_id,
        bids: parse_levels(raw.bids)?,
        asks: parse_levels(raw.asks)?,
    })
}

fn convert_agg_trade(raw: RawAggTrade) -> Result<AggTrade, ParseError> {
    Ok(AggTrade {
        event_time: raw.event_time,
        symbol: raw.symbol,
        agg_trade_id: raw.agg_trade_id,
        price: raw.price.parse::<f64>()?,
        quantity: raw.quantity.parse::<f64>()?,
        first_trade_id: raw.first_trade_id,
        last_trade_id: raw.last_trade_id,
        trade_time: raw.trade_time,
        is_buyer_maker: raw.is_buyer_maker,
    })
}

/// Parse one combined-stream frame (`{"stream": ..., "data": {...}}`) and
/// classify it by stream-name suffix.
pub fn parse_stream_message(text: &str) -> Result<StreamPayload, ParseError> {
    let frame: RawStreamFrame = serde_json::from_str(text)?;

    if is_depth_stream(&frame.stream) {
        let raw: RawDepthUpdate = serde_json::from_value(frame.data)?;
        Ok(StreamPayload::Depth(convert_depth_update(raw)?))
    } else if is_agg_trade_stream(&frame.stream) {
        let raw: RawAggTrade = serde_json::from_value(frame.data)?;
        Ok(StreamPayload::Trade(convert_agg_trade(raw)?))
    } else {
        Ok(StreamPayload::Unknown(frame.stream))
    }
}

/// Parse a REST depth snapshot body. The endpoint does not echo the symbol,
/// so the caller supplies it.
pub fn parse_depth_snapshot(text: &str, symbol: &str) -> Result<DepthSnapshot, ParseError> {
    let raw: RawDepthSnapshot = serde_json::from_str(text)?;
    Ok(DepthSnapshot {
        last_update_id: raw.last_update_id,
        symbol: symbol.to_string(),
        bids: parse_levels(raw.bids)?,
        asks: parse_levels(raw.asks)?,
    })
}
