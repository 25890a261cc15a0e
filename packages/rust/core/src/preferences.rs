//! Per-user interest scores: reactions, news filtering and prompt buckets.

use serde::Serialize;
use tracing::info;

use mojarung_shared::{MojarungError, NewsFilter, Result, Tag, TagScores, User};
use mojarung_storage::Storage;

/// Scores at or above this count as a favourite sector.
const LOVED_FROM: i64 = 3;
/// Scores below this count as a disliked sector.
const UNLOVED_BELOW: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    fn delta(self) -> i64 {
        match self {
            Self::Like => 1,
            Self::Dislike => -1,
        }
    }
}

/// Filter for a personalised feed: every tag the user does not dislike
/// (score ≥ 0) plus the tickers they follow.
pub fn interest_filter(scores: &TagScores, tickers: &[String]) -> NewsFilter {
    NewsFilter {
        tags: scores
            .iter()
            .filter(|&(_, score)| score >= 0)
            .map(|(tag, _)| tag.label().to_string())
            .collect(),
        tickers: tickers.to_vec(),
    }
}

/// Add ±1 to the user's score for every known tag of an article.
/// Returns the tags that were adjusted.
pub async fn apply_reaction(
    storage: &Storage,
    user: &User,
    article_id: i64,
    reaction: Reaction,
) -> Result<Vec<Tag>> {
    let article = storage
        .get_article(article_id)
        .await?
        .ok_or_else(|| MojarungError::not_found("News article"))?;

    let tags = article.tags.as_deref().map(Tag::parse_list).unwrap_or_default();
    if !tags.is_empty() {
        storage
            .adjust_tag_scores(user.id, &tags, reaction.delta())
            .await?;
    }
    info!(user = %user.id, article_id, ?reaction, tags = tags.len(), "reaction applied");
    Ok(tags)
}

/// Tags split by how much the user likes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagBuckets {
    pub loved: Vec<Tag>,
    pub neutral: Vec<Tag>,
    pub unloved: Vec<Tag>,
}

impl TagBuckets {
    pub fn from_scores(scores: &TagScores) -> Self {
        let mut buckets = Self::default();
        for (tag, score) in scores.iter() {
            if score >= LOVED_FROM {
                buckets.loved.push(tag);
            } else if score >= UNLOVED_BELOW {
                buckets.neutral.push(tag);
            } else {
                buckets.unloved.push(tag);
            }
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use mojarung_shared::{NewArticle, NewUser};

    #[test]
    fn filter_keeps_non_negative_tags_and_tickers() {
        let mut scores = TagScores::default();
        scores.set(Tag::Energy, -1);
        scores.set(Tag::Finance, 4);
        let filter = interest_filter(&scores, &["SBER".to_string()]);

        assert_eq!(filter.tags.len(), Tag::ALL.len() - 1);
        assert!(!filter.tags.iter().any(|t| t == "энергетика"));
        assert!(filter.tags.iter().any(|t| t == "финансы"));
        assert_eq!(filter.tickers, vec!["SBER"]);
    }

    #[test]
    fn bucket_boundaries() {
        let mut scores = TagScores::default();
        scores.set(Tag::Finance, 3);
        scores.set(Tag::Tech, 2);
        scores.set(Tag::Energy, -1);
        scores.set(Tag::Telecom, -2);
        let buckets = TagBuckets::from_scores(&scores);

        assert_eq!(buckets.loved, vec![Tag::Finance]);
        assert_eq!(buckets.unloved, vec![Tag::Telecom]);
        assert!(buckets.neutral.contains(&Tag::Tech));
        assert!(buckets.neutral.contains(&Tag::Energy));
        assert_eq!(buckets.neutral.len(), Tag::ALL.len() - 2);
    }

    #[tokio::test]
    async fn reactions_move_scores() {
        let storage = test_storage().await;
        let user = storage
            .insert_user(&NewUser {
                email: "olga@example.com".into(),
                username: "olga".into(),
                hashed_password: "hash".into(),
            })
            .await
            .expect("user");
        let article = storage
            .insert_article(&NewArticle {
                title: "Т".into(),
                full_text: "Текст".into(),
                tags: Some("финансы, космос, технологии".into()),
                ..NewArticle::default()
            })
            .await
            .expect("article");

        let tags = apply_reaction(&storage, &user, article.id, Reaction::Like)
            .await
            .expect("like");
        assert_eq!(tags, vec![Tag::Finance, Tag::Tech]);
        apply_reaction(&storage, &user, article.id, Reaction::Like)
            .await
            .expect("like");
        apply_reaction(&storage, &user, article.id, Reaction::Dislike)
            .await
            .expect("dislike");

        let scores = storage.get_tag_scores(user.id).await.expect("scores");
        assert_eq!(scores.get(Tag::Finance), 1);
        assert_eq!(scores.get(Tag::Tech), 1);
        assert_eq!(scores.get(Tag::Energy), 0);

        let missing = apply_reaction(&storage, &user, 9999, Reaction::Like).await;
        assert!(matches!(missing, Err(MojarungError::NotFound(_))));
    }
}
