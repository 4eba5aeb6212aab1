//! ナンバープレート識別子
//!
//! 受け付ける形式は2種類のみ（大文字・完全一致）:
//! - 旧形式 `LLLDDDD`（英字3 + 数字4）
//! - 現行形式 `LLLDLDD`（英字3 + 数字1 + 英字1 + 数字2）

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PlateError;

const PLATE_LEN: usize = 7;

/// プレート形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateFormat {
    /// 旧形式 (例: ABC1234)
    Legacy,
    /// 現行形式 (例: ABC1D23)
    Mercosul,
}

impl PlateFormat {
    /// 形式から推定される登録年の範囲
    pub fn estimated_years(self) -> &'static str {
        match self {
            PlateFormat::Legacy => "2000-2018",
            PlateFormat::Mercosul => "2018-present",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlateFormat::Legacy => "legacy",
            PlateFormat::Mercosul => "mercosul",
        }
    }
}

/// 検証済みプレート識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Plate(String);

impl Plate {
    pub fn parse(raw: &str) -> Result<Self, PlateError> {
        match detect_format(raw) {
            Some(_) => Ok(Self(raw.to_string())),
            None => Err(PlateError::InvalidFormat(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn format(&self) -> PlateFormat {
        // parse済みなので必ずどちらかに一致する
        detect_format(&self.0).unwrap_or(PlateFormat::Legacy)
    }
}

fn detect_format(raw: &str) -> Option<PlateFormat> {
    let b = raw.as_bytes();
    if b.len() != PLATE_LEN || !b[..3].iter().all(u8::is_ascii_uppercase) {
        return None;
    }
    if !b[3].is_ascii_digit() || !b[5..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    if b[4].is_ascii_digit() {
        Some(PlateFormat::Legacy)
    } else if b[4].is_ascii_uppercase() {
        Some(PlateFormat::Mercosul)
    } else {
        None
    }
}

impl FromStr for Plate {
    type Err = PlateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Plate {
    type Error = PlateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match detect_format(&value) {
            Some(_) => Ok(Self(value)),
            None => Err(PlateError::InvalidFormat(value)),
        }
    }
}

impl From<Plate> for String {
    fn from(plate: Plate) -> Self {
        plate.0
    }
}

impl AsRef<str> for Plate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 開発用のテストプレート（旧形式）を生成
pub fn generate_test_plates(count: usize) -> Vec<Plate> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let letters: String = (0..3).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
            let digits: String = (0..4).map(|_| rng.gen_range(b'0'..=b'9') as char).collect();
            Plate(format!("{}{}", letters, digits))
        })
        .collect()
}
