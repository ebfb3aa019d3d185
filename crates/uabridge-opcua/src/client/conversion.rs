// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA value to JSON conversion.
//!
//! # Mapping
//!
//! | Variant          | JSON                                   |
//! |------------------|----------------------------------------|
//! | Empty            | `null`                                 |
//! | Boolean          | `true` / `false`                       |
//! | integers         | number                                 |
//! | Float / Double   | number, `null` for NaN and infinities  |
//! | String           | string                                 |
//! | DateTime         | RFC 3339 string                        |
//! | Guid             | hyphenated string                      |
//! | ByteString       | base64 string                          |
//! | NodeId           | `ns=2;i=1001` string                   |
//! | QualifiedName    | `{"namespaceIndex", "name"}`           |
//! | LocalizedText    | `{"locale", "text"}`                   |
//! | StatusCode       | number                                 |
//! | Array            | array, element-wise                    |
//!
//! A value whose status is bad converts to `null` regardless of its variant.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::SecondsFormat;
use serde_json::{json, Number, Value};

use crate::types::StatusCode;

use super::gateway::{DataValue, Variant};

// =============================================================================
// Quality
// =============================================================================

/// Coarse quality derived from a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    /// Value is usable.
    Good,
    /// Value is usable but may be inaccurate.
    Uncertain,
    /// Value is not usable.
    Bad,
}

impl Quality {
    /// Classifies a status code by its severity bits.
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_bad() {
            Self::Bad
        } else if status.is_uncertain() {
            Self::Uncertain
        } else {
            Self::Good
        }
    }

    /// Returns `true` unless the quality is bad.
    #[inline]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Bad)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::Uncertain => write!(f, "Uncertain"),
            Self::Bad => write!(f, "Bad"),
        }
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// Converts a data value to JSON.
pub fn data_value_to_json(value: &DataValue) -> Value {
    let quality = Quality::from_status(value.status);
    if !quality.is_usable() {
        tracing::trace!(status = %value.status, "Bad value status, converting to null");
        return Value::Null;
    }
    variant_to_json(&value.value)
}

/// Converts a variant to JSON.
pub fn variant_to_json(variant: &Variant) -> Value {
    match variant {
        Variant::Empty => Value::Null,
        Variant::Boolean(v) => Value::Bool(*v),
        Variant::SByte(v) => json!(v),
        Variant::Byte(v) => json!(v),
        Variant::Int16(v) => json!(v),
        Variant::UInt16(v) => json!(v),
        Variant::Int32(v) => json!(v),
        Variant::UInt32(v) => json!(v),
        Variant::Int64(v) => json!(v),
        Variant::UInt64(v) => json!(v),
        Variant::Float(v) => float(f64::from(*v)),
        Variant::Double(v) => float(*v),
        Variant::String(v) => Value::String(v.clone()),
        Variant::DateTime(v) => Value::String(v.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Variant::Guid(v) => Value::String(v.hyphenated().to_string()),
        Variant::ByteString(v) => Value::String(BASE64.encode(v)),
        Variant::NodeId(v) => Value::String(v.to_opc_string()),
        Variant::QualifiedName(v) => json!({
            "namespaceIndex": v.namespace_index,
            "name": v.name,
        }),
        Variant::LocalizedText { locale, text } => json!({
            "locale": locale,
            "text": text,
        }),
        Variant::StatusCode(v) => json!(v.0),
        Variant::Array(items) => Value::Array(items.iter().map(variant_to_json).collect()),
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
