//! 正規フィールドとラベル正規化
//!
//! 取得元ごとに異なるラベル（"Combustível", "Ano Modelo:" など）を
//! 固定の14フィールドに対応付ける。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 正規フィールド（14種）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Brand,
    GenericName,
    Model,
    Imported,
    ModelYear,
    ManufactureYear,
    Color,
    EngineDisplacement,
    FuelType,
    ChassisNumber,
    EngineNumber,
    SeatingCapacity,
    RegionCode,
    Municipality,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 14] = [
        CanonicalField::Brand,
        CanonicalField::GenericName,
        CanonicalField::Model,
        CanonicalField::Imported,
        CanonicalField::ModelYear,
        CanonicalField::ManufactureYear,
        CanonicalField::Color,
        CanonicalField::EngineDisplacement,
        CanonicalField::FuelType,
        CanonicalField::ChassisNumber,
        CanonicalField::EngineNumber,
        CanonicalField::SeatingCapacity,
        CanonicalField::RegionCode,
        CanonicalField::Municipality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Brand => "brand",
            CanonicalField::GenericName => "generic_name",
            CanonicalField::Model => "model",
            CanonicalField::Imported => "imported",
            CanonicalField::ModelYear => "model_year",
            CanonicalField::ManufactureYear => "manufacture_year",
            CanonicalField::Color => "color",
            CanonicalField::EngineDisplacement => "engine_displacement",
            CanonicalField::FuelType => "fuel_type",
            CanonicalField::ChassisNumber => "chassis_number",
            CanonicalField::EngineNumber => "engine_number",
            CanonicalField::SeatingCapacity => "seating_capacity",
            CanonicalField::RegionCode => "region_code",
            CanonicalField::Municipality => "municipality",
        }
    }

    /// 生ラベルから正規フィールドを決定
    ///
    /// 大文字小文字を無視した部分一致。複数の候補に一致する場合は
    /// [`LABEL_PRIORITY`] で先に現れるものが勝つ。
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().trim_end_matches(':').trim().to_lowercase();
        if label.is_empty() {
            return None;
        }
        LABEL_PRIORITY
            .iter()
            .find(|(phrase, _)| label.contains(phrase))
            .map(|(_, field)| *field)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ラベル照合の優先順位（先勝ち）
///
/// "ano modelo" は "modelo" と "ano" より前、"modelo" は "ano" より前に置く。
/// "uf" は短く誤一致しやすいので最後。
const LABEL_PRIORITY: &[(&str, CanonicalField)] = &[
    ("ano modelo", CanonicalField::ModelYear),
    ("ano de fabricação", CanonicalField::ManufactureYear),
    ("ano de fabricacao", CanonicalField::ManufactureYear),
    ("marca", CanonicalField::Brand),
    ("genérico", CanonicalField::GenericName),
    ("generico", CanonicalField::GenericName),
    ("modelo", CanonicalField::Model),
    ("importado", CanonicalField::Imported),
    ("ano", CanonicalField::ManufactureYear),
    ("cilindrada", CanonicalField::EngineDisplacement),
    ("combustível", CanonicalField::FuelType),
    ("combustivel", CanonicalField::FuelType),
    ("chassi", CanonicalField::ChassisNumber),
    ("motor", CanonicalField::EngineNumber),
    ("passageiros", CanonicalField::SeatingCapacity),
    ("município", CanonicalField::Municipality),
    ("municipio", CanonicalField::Municipality),
    ("cor", CanonicalField::Color),
    ("uf", CanonicalField::RegionCode),
];

/// 値の正規化。空・"-"・"N/A" は欠損として扱う
pub fn normalize_value(value: &str) -> Option<String> {
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() || value == "-" || value.eq_ignore_ascii_case("n/a") {
        None
    } else {
        Some(value)
    }
}

/// (ラベル, 値) の組を正規化。対応なし・欠損値なら None
pub fn normalize(label: &str, value: &str) -> Option<(CanonicalField, String)> {
    let field = CanonicalField::from_label(label)?;
    let value = normalize_value(value)?;
    Some((field, value))
}

/// 疎な正規フィールドの集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleFields(BTreeMap<CanonicalField, String>);

impl VehicleFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// 行の列から組み立てる（同じフィールドは最初の行が勝つ）
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut fields = Self::new();
        for (label, value) in rows {
            if let Some((field, value)) = normalize(label, value) {
                fields.insert_if_absent(field, value);
            }
        }
        fields
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn insert(&mut self, field: CanonicalField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    pub fn insert_if_absent(&mut self, field: CanonicalField, value: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| value.into());
    }

    /// `other` に存在するフィールドのみ上書きする
    pub fn merge_from(&mut self, other: &VehicleFields) {
        for (field, value) in &other.0 {
            self.0.insert(*field, value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.0.iter().map(|(f, v)| (*f, v.as_str()))
    }
}

impl FromIterator<(CanonicalField, String)> for VehicleFields {
    fn from_iter<T: IntoIterator<Item = (CanonicalField, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
