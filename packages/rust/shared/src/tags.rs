//! The interest-tag catalogue.
//!
//! News articles and companies are labelled with Russian sector names; users
//! carry one integer score per sector. [`Tag`] ties the two together.


use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One of the fourteen market sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Energy,
    Finance,
    Tech,
    Industry,
    ConsumerSector,
    Infrastructure,
    Agriculture,
    Healthcare,
    RealEstate,
    Materials,
    Telecom,
    Entertainment,
    Education,
    Ecommerce,
}

impl Tag {
    /// Every tag, in catalogue order.
    pub const ALL: [Tag; 14] = [
        Tag::Energy,
        Tag::Finance,
        Tag::Tech,
        Tag::Industry,
        Tag::ConsumerSector,
        Tag::Infrastructure,
        Tag::Agriculture,
        Tag::Healthcare,
        Tag::RealEstate,
        Tag::Materials,
        Tag::Telecom,
        Tag::Entertainment,
        Tag::Education,
        Tag::Ecommerce,
    ];

    /// The label used in article and company tag lists.
    pub fn label(self) -> &'static str {
        match self {
            Tag::Energy => "энергетика",
            Tag::Finance => "финансы",
            Tag::Tech => "технологии",
            Tag::Industry => "промышленность",
            Tag::ConsumerSector => "потребительский сектор",
            Tag::Infrastructure => "инфраструктура",
            Tag::Agriculture => "сельское хозяйство",
            Tag::Healthcare => "здравоохранение",
            Tag::RealEstate => "недвижимость",
            Tag::Materials => "материалы",
            Tag::Telecom => "телекоммуникации",
            Tag::Entertainment => "развлечения",
            Tag::Education => "образование",
            Tag::Ecommerce => "электронная коммерция",
        }
    }

    /// The per-user score key, e.g. `tag_energy`.
    pub fn key(self) -> &'static str {
        match self {
            Tag::Energy => "tag_energy",
            Tag::Finance => "tag_finance",
            Tag::Tech => "tag_tech",
            Tag::Industry => "tag_industry",
            Tag::ConsumerSector => "tag_consumer_sector",
            Tag::Infrastructure => "tag_infrastructure",
            Tag::Agriculture => "tag_agriculture",
            Tag::Healthcare => "tag_healthcare",
            Tag::RealEstate => "tag_real_estate",
            Tag::Materials => "tag_materials",
            Tag::Telecom => "tag_telecom",
            Tag::Entertainment => "tag_entertainment",
            Tag::Education => "tag_education",
            Tag::Ecommerce => "tag_ecommerce",
        }
    }

    /// Look up a tag by its label (case-insensitive, surrounding whitespace ignored).
    pub fn from_label(label: &str) -> Option<Tag> {
        let needle = label.trim().to_lowercase();
        Tag::ALL.into_iter().find(|t| t.label() == needle)
    }

    /// Look up a tag by its score key.
    pub fn from_key(key: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Parse a comma-separated label list. Unknown labels are dropped,
    /// order is kept and repeats are removed.
    pub fn parse_list(list: &str) -> Vec<Tag> {
        let mut tags = Vec::new();
        for tag in list.split(',').filter_map(Tag::from_label) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// All labels joined with `", "`, as shown to the LLM.
    pub fn label_list() -> String {
        Tag::ALL.map(Tag::label).join(", ")
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Join tags back into the stored comma-separated form.
pub fn join_tags(tags: &[Tag]) -> String {
    tags.iter().map(|t| t.label()).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// TagScores
// ---------------------------------------------------------------------------

/// A user's interest score for every tag. Missing scores are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagScores([i64; 14]);

impl TagScores {
    pub fn get(&self, tag: Tag) -> i64 {
        self.0[tag.index()]
    }

    pub fn set(&mut self, tag: Tag, score: i64) {
        self.0[tag.index()] = score;
    }

    /// Iterate `(tag, score)` pairs in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, i64)> + '_ {
        Tag::ALL.into_iter().map(|t| (t, self.get(t)))
    }
}

/// Serializes as a map from sector label to score.
impl Serialize for TagScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Tag::ALL.len()))?;
        for (tag, score) in self.iter() {
            map.serialize_entry(tag.label(), &score)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_keys_are_unique() {
        let mut labels: Vec<_> = Tag::ALL.iter().map(|t| t.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 14);

        for tag in Tag::ALL {
            assert_eq!(Tag::from_key(tag.key()), Some(tag));
            assert_eq!(Tag::from_label(tag.label()), Some(tag));
        }
    }

    #[test]
    fn parse_list_skips_unknown_and_repeats() {
        let tags = Tag::parse_list("Финансы, космос,  технологии, финансы,");
        assert_eq!(tags, vec![Tag::Finance, Tag::Tech]);
        assert_eq!(join_tags(&tags), "финансы, технологии");
    }

    #[test]
    fn multi_word_labels_parse() {
        assert_eq!(
            Tag::from_label(" сельское хозяйство "),
            Some(Tag::Agriculture)
        );
        assert_eq!(
            Tag::from_label("электронная коммерция"),
            Some(Tag::Ecommerce)
        );
    }

    #[test]
    fn scores_serialize_by_label() {
        let mut scores = TagScores::default();
        scores.set(Tag::Energy, 3);
        scores.set(Tag::Telecom, -2);

        let json = serde_json::to_value(scores).expect("serialize");
        assert_eq!(json["энергетика"], 3);
        assert_eq!(json[Tag::Telecom.label()], -2);
        assert_eq!(json["финансы"], 0);
        assert!(json.get("tag_energy").is_none());
        assert_eq!(json.as_object().map(|m| m.len()), Some(14));
    }
}
