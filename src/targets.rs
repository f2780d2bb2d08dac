//! Save-target vocabulary and its mapping onto `products` columns.
//!
//! Every identifier the UI can offer is a variant here, so an unmapped target
//! can only appear while parsing a wire string.

use serde::Serialize;

/// A point in the production pipeline that has its own text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStage {
    Sketch,
    Wax,
    Cast,
    Final,
}

impl ProductionStage {
    pub const ALL: [ProductionStage; 4] = [
        ProductionStage::Sketch,
        ProductionStage::Wax,
        ProductionStage::Cast,
        ProductionStage::Final,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            ProductionStage::Sketch => "Sketch",
            ProductionStage::Wax => "Wax",
            ProductionStage::Cast => "Cast",
            ProductionStage::Final => "Final",
        }
    }
}

/// Which image column an image save lands in. `Original` is write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSlot {
    Original,
    Stage(ProductionStage),
}

impl ImageSlot {
    pub fn column(&self) -> Column {
        match self {
            ImageSlot::Original => Column::PreImage,
            ImageSlot::Stage(ProductionStage::Sketch) => Column::SketchImage,
            ImageSlot::Stage(ProductionStage::Wax) => Column::WaxImage,
            ImageSlot::Stage(ProductionStage::Cast) => Column::CastImage,
            ImageSlot::Stage(ProductionStage::Final) => Column::FinalImage,
        }
    }

    /// Human-readable phrase used in storage keys.
    pub fn phrase(&self) -> &'static str {
        match self {
            ImageSlot::Original => "original product photo",
            ImageSlot::Stage(ProductionStage::Sketch) => "concept sketch",
            ImageSlot::Stage(ProductionStage::Wax) => "wax model",
            ImageSlot::Stage(ProductionStage::Cast) => "raw casting",
            ImageSlot::Stage(ProductionStage::Final) => "finished piece",
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self, ImageSlot::Original)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTarget {
    Description(ProductionStage),
    AltText(ProductionStage),
    ProductName,
    MetaTitle,
    MetaDescription,
}

impl TextTarget {
    pub fn column(&self) -> Column {
        use ProductionStage::*;
        match self {
            TextTarget::Description(Sketch) => Column::SketchDescription,
            TextTarget::Description(Wax) => Column::WaxDescription,
            TextTarget::Description(Cast) => Column::CastDescription,
            TextTarget::Description(Final) => Column::FinalDescription,
            TextTarget::AltText(Sketch) => Column::SketchAltText,
            TextTarget::AltText(Wax) => Column::WaxAltText,
            TextTarget::AltText(Cast) => Column::CastAltText,
            TextTarget::AltText(Final) => Column::FinalAltText,
            TextTarget::ProductName => Column::ProductName,
            TextTarget::MetaTitle => Column::MetaTitle,
            TextTarget::MetaDescription => Column::MetaDescription,
        }
    }
}

/// What kind of payload a save carries, as sent in the `dataType` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    Image,
    Description,
}

impl DataType {
    pub fn from_wire(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "image" => Some(DataType::Image),
            "description" | "text" => Some(DataType::Description),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveTarget {
    Image(ImageSlot),
    Text(TextTarget),
}

impl SaveTarget {
    /// Every target the UI may offer.
    pub fn all() -> Vec<SaveTarget> {
        let mut targets = vec![SaveTarget::Image(ImageSlot::Original)];
        targets.extend(
            ProductionStage::ALL
                .iter()
                .map(|stage| SaveTarget::Image(ImageSlot::Stage(*stage))),
        );
        for stage in ProductionStage::ALL {
            targets.push(SaveTarget::Text(TextTarget::Description(stage)));
            targets.push(SaveTarget::Text(TextTarget::AltText(stage)));
        }
        targets.push(SaveTarget::Text(TextTarget::ProductName));
        targets.push(SaveTarget::Text(TextTarget::MetaTitle));
        targets.push(SaveTarget::Text(TextTarget::MetaDescription));
        targets
    }

    pub fn wire_name(&self) -> String {
        match self {
            SaveTarget::Image(ImageSlot::Original) => "Pre".to_string(),
            SaveTarget::Image(ImageSlot::Stage(stage)) => stage.wire_name().to_string(),
            SaveTarget::Text(TextTarget::Description(stage)) => {
                format!("{}_description", stage.wire_name())
            }
            SaveTarget::Text(TextTarget::AltText(stage)) => {
                format!("{}_alt_text", stage.wire_name())
            }
            SaveTarget::Text(TextTarget::ProductName) => "Product_name".to_string(),
            SaveTarget::Text(TextTarget::MetaTitle) => "Meta_title".to_string(),
            SaveTarget::Text(TextTarget::MetaDescription) => "Meta_description".to_string(),
        }
    }

    /// Case-insensitive lookup of a wire identifier such as `Wax` or `Meta_title`.
    pub fn from_wire(input: &str) -> Option<Self> {
        let wanted = input.trim();
        Self::all()
            .into_iter()
            .find(|target| target.wire_name().eq_ignore_ascii_case(wanted))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            SaveTarget::Image(_) => DataType::Image,
            SaveTarget::Text(_) => DataType::Description,
        }
    }

    pub fn column(&self) -> Column {
        match self {
            SaveTarget::Image(slot) => slot.column(),
            SaveTarget::Text(target) => target.column(),
        }
    }
}

/// Persisted columns of the `products` table that saves may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    PreImage,
    SketchImage,
    WaxImage,
    CastImage,
    FinalImage,
    SketchDescription,
    WaxDescription,
    CastDescription,
    FinalDescription,
    SketchAltText,
    WaxAltText,
    CastAltText,
    FinalAltText,
    ProductName,
    MetaTitle,
    MetaDescription,
}

impl Column {
    /// Fields counted towards listing completeness. Alt text is not tracked.
    pub const TRACKED: [Column; 12] = [
        Column::PreImage,
        Column::SketchImage,
        Column::WaxImage,
        Column::CastImage,
        Column::FinalImage,
        Column::SketchDescription,
        Column::WaxDescription,
        Column::CastDescription,
        Column::FinalDescription,
        Column::ProductName,
        Column::MetaTitle,
        Column::MetaDescription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::PreImage => "pre_image",
            Column::SketchImage => "sketch_image",
            Column::WaxImage => "wax_image",
            Column::CastImage => "cast_image",
            Column::FinalImage => "final_image",
            Column::SketchDescription => "sketch_description",
            Column::WaxDescription => "wax_description",
            Column::CastDescription => "cast_description",
            Column::FinalDescription => "final_description",
            Column::SketchAltText => "sketch_alt_text",
            Column::WaxAltText => "wax_alt_text",
            Column::CastAltText => "cast_alt_text",
            Column::FinalAltText => "final_alt_text",
            Column::ProductName => "product_name",
            Column::MetaTitle => "meta_title",
            Column::MetaDescription => "meta_description",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "dataType")]
    pub data_type: DataType,
    pub column: &'static str,
}

pub fn vocabulary() -> Vec<TargetInfo> {
    SaveTarget::all()
        .into_iter()
        .map(|target| TargetInfo {
            id: target.wire_name(),
            data_type: target.data_type(),
            column: target.column().as_str(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn wire_names_round_trip_for_every_target() {
        for target in SaveTarget::all() {
            assert_eq!(SaveTarget::from_wire(&target.wire_name()), Some(target));
        }
    }

    #[test]
    fn lookup_is_case_insensitive_and_trimmed() {
        assert_eq!(
            SaveTarget::from_wire(" meta_TITLE "),
            Some(SaveTarget::Text(TextTarget::MetaTitle))
        );
        assert_eq!(
            SaveTarget::from_wire("wax"),
            Some(SaveTarget::Image(ImageSlot::Stage(ProductionStage::Wax)))
        );
        assert_eq!(SaveTarget::from_wire("Pre_description"), None);
        assert_eq!(SaveTarget::from_wire("Wax_image"), None);
    }

    #[test]
    fn every_target_maps_to_a_distinct_column() {
        let columns: HashSet<_> = SaveTarget::all().iter().map(|t| t.column()).collect();
        assert_eq!(columns.len(), SaveTarget::all().len());
    }

    #[test]
    fn tracked_fields_exclude_alt_text() {
        assert_eq!(Column::TRACKED.len(), 12);
        assert!(
            Column::TRACKED
                .iter()
                .all(|column| !column.as_str().ends_with("_alt_text"))
        );
    }

    #[test]
    fn vocabulary_reports_kind_and_column() {
        let vocab = vocabulary();
        let wax = vocab.iter().find(|t| t.id == "Wax").expect("wax target");
        assert_eq!(wax.data_type, DataType::Image);
        assert_eq!(wax.column, "wax_image");
        let title = vocab.iter().find(|t| t.id == "Meta_title").expect("title");
        assert_eq!(title.data_type, DataType::Description);
        assert_eq!(title.column, "meta_title");
    }

    #[test]
    fn data_type_accepts_form_spellings() {
        assert_eq!(DataType::from_wire(" Image "), Some(DataType::Image));
        assert_eq!(DataType::from_wire("Description"), Some(DataType::Description));
        assert_eq!(DataType::from_wire("text"), Some(DataType::Description));
        assert_eq!(DataType::from_wire("video"), None);
    }
}
