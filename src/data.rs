//! Rating and item records, the ratings/items join, and train/test splits.
use std::collections::HashMap;
use std::hash::Hasher;

use chrono::{Datelike, NaiveDate};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use serde_derive::{Deserialize, Serialize};
use siphasher::sip::SipHasher;

use crate::{FittingError, ItemId, Timestamp, UserId};

/// Rows that carry a (user, item, rating) triple.
pub trait RatingEvent {
    /// The rating user.
    fn user_id(&self) -> UserId;
    /// The rated item.
    fn item_id(&self) -> ItemId;
    /// The star rating, as the regression target.
    fn rating(&self) -> f32;
}

/// A single rating event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rating {
    user_id: UserId,
    item_id: ItemId,
    rating: u8,
    timestamp: Timestamp,
}

impl Rating {
    /// Build a new rating.
    pub fn new(user_id: UserId, item_id: ItemId, rating: u8, timestamp: Timestamp) -> Self {
        Rating {
            user_id,
            item_id,
            rating,
            timestamp,
        }
    }

    /// The star rating as stored.
    pub fn stars(&self) -> u8 {
        self.rating
    }

    /// Time of the rating, in seconds since the epoch.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl RatingEvent for Rating {
    fn user_id(&self) -> UserId {
        self.user_id
    }
    fn item_id(&self) -> ItemId {
        self.item_id
    }
    fn rating(&self) -> f32 {
        f32::from(self.rating)
    }
}

/// Item metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    item_id: ItemId,
    title: String,
    release_date: Option<NaiveDate>,
}

impl Item {
    /// Build a new item with no release date.
    pub fn new<T: Into<String>>(item_id: ItemId, title: T) -> Self {
        Item {
            item_id,
            title: title.into(),
            release_date: None,
        }
    }

    /// Set the release date.
    pub fn release_date(mut self, release_date: Option<NaiveDate>) -> Self {
        self.release_date = release_date;
        self
    }

    /// The item id.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// The item title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Year of release, if the release date is known.
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|date| date.year())
    }
}

/// Parse a Movielens-style release date such as `01-Jan-1995`.
///
/// Unparsable or empty dates yield `None`.
pub fn parse_release_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%d-%b-%Y").ok()
}

/// A rating joined with the metadata of the rated item.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedRating {
    /// The underlying rating.
    pub rating: Rating,
    /// Title of the rated item.
    pub title: String,
    /// Release year of the rated item, if known.
    pub release_year: Option<i32>,
    /// Number of ratings referencing the rated item.
    pub popularity: usize,
}

impl RatingEvent for EnrichedRating {
    fn user_id(&self) -> UserId {
        self.rating.user_id
    }
    fn item_id(&self) -> ItemId {
        self.rating.item_id
    }
    fn rating(&self) -> f32 {
        RatingEvent::rating(&self.rating)
    }
}

/// Count ratings per item.
///
/// Items with no ratings are absent from the map.
pub fn popularity<T: RatingEvent>(ratings: &[T]) -> HashMap<ItemId, usize> {
    let mut counts = HashMap::new();

    for rating in ratings {
        *counts.entry(rating.item_id()).or_insert(0) += 1;
    }

    counts
}

/// Inner-join ratings with items on the item id.
///
/// Ratings whose item is unknown are dropped. The order of the remaining
/// ratings is preserved.
pub fn join(ratings: &[Rating], items: &[Item]) -> Vec<EnrichedRating> {
    let items: HashMap<ItemId, &Item> = items.iter().map(|item| (item.item_id, item)).collect();
    let counts = popularity(ratings);

    ratings
        .iter()
        .filter_map(|rating| {
            items.get(&rating.item_id).map(|item| EnrichedRating {
                rating: rating.clone(),
                title: item.title.clone(),
                release_year: item.release_year(),
                popularity: counts.get(&rating.item_id).cloned().unwrap_or(0),
            })
        })
        .collect()
}

/// Largest user and item ids in `rows`, or `None` if `rows` is empty.
pub fn max_ids<T: RatingEvent>(rows: &[T]) -> Option<(UserId, ItemId)> {
    let max_user_id = rows.iter().map(|x| x.user_id()).max()?;
    let max_item_id = rows.iter().map(|x| x.item_id()).max()?;

    Some((max_user_id, max_item_id))
}

fn check_test_fraction(test_fraction: f32) -> Result<(), FittingError> {
    if test_fraction > 0.0 && test_fraction < 1.0 {
        Ok(())
    } else {
        Err(FittingError::InvalidConfiguration(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )))
    }
}

// `fraction * len`, bounded by the representation error of an f32
// fraction: `fraction` is read as the decimal it was written as, so
// `0.3 * 100` counts 30 rows rather than 31.
fn scaled_bounds(fraction: f32, len: usize) -> (f64, f64) {
    let product = f64::from(fraction) * len as f64;
    let error = product * f64::from(std::f32::EPSILON);

    (product - error, product + error)
}

/// `ceil(fraction * len)` for a fraction given at f32 precision.
pub(crate) fn ceil_count(fraction: f32, len: usize) -> usize {
    (scaled_bounds(fraction, len).0.ceil() as usize).min(len)
}

/// `floor(fraction * len)` for a fraction given at f32 precision.
pub(crate) fn floor_count(fraction: f32, len: usize) -> usize {
    (scaled_bounds(fraction, len).1.floor() as usize).min(len)
}

/// Randomly partition rows into `(train, test)`.
///
/// The test set receives `ceil(test_fraction * rows.len())` rows, with
/// `test_fraction` taken as the decimal it was written as. The partition
/// depends only on `seed` and the input order.
pub fn train_test_split<T: Clone>(
    rows: &[T],
    test_fraction: f32,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), FittingError> {
    check_test_fraction(test_fraction)?;

    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    indices.shuffle(&mut rng);

    let num_test = ceil_count(test_fraction, rows.len());
    let (test, train) = indices.split_at(num_test);

    Ok((
        train.iter().map(|&idx| rows[idx].clone()).collect(),
        test.iter().map(|&idx| rows[idx].clone()).collect(),
    ))
}

/// Partition rows into `(train, test)` so that all of a user's ratings
/// land on the same side.
///
/// Roughly `test_fraction` of users go to the test set.
pub fn user_based_split<T: RatingEvent + Clone>(
    rows: &[T],
    test_fraction: f32,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), FittingError> {
    check_test_fraction(test_fraction)?;

    let denominator = 100_000;
    let test_cutoff = (test_fraction * denominator as f32) as u64;

    let mut rng = XorShiftRng::seed_from_u64(seed);
    let (key_0, key_1) = (rng.gen::<u64>(), rng.gen::<u64>());

    let is_train = |x: &T| {
        let mut hasher = SipHasher::new_with_keys(key_0, key_1);
        hasher.write_usize(x.user_id());
        hasher.finish() % denominator >= test_cutoff
    };

    let (train, test): (Vec<T>, Vec<T>) = rows.iter().cloned().partition(|x| is_train(x));

    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn scenario() -> (Vec<Rating>, Vec<Item>) {
        let items = vec![Item::new(1, "A"), Item::new(2, "B")];
        let ratings = vec![Rating::new(10, 1, 5, 0), Rating::new(10, 2, 1, 1)];

        (ratings, items)
    }

    #[test]
    fn join_enriches_rows() {
        let (mut ratings, mut items) = scenario();
        ratings.push(Rating::new(11, 1, 3, 2));
        items[0] = Item::new(1, "A").release_date(parse_release_date("01-Jan-1995"));

        let rows = join(&ratings, &items);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].title, "A");
        assert_eq!(rows[0].release_year, Some(1995));
        assert_eq!(rows[0].popularity, 2);
        assert_eq!(rows[1].title, "B");
        assert_eq!(rows[1].release_year, None);
        assert_eq!(rows[1].popularity, 1);
    }

    #[test]
    fn join_drops_unknown_items() {
        let (mut ratings, items) = scenario();
        ratings.push(Rating::new(10, 3, 4, 2));

        let rows = join(&ratings, &items);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.item_id() != 3));
    }

    #[test]
    fn popularity_omits_unrated_items() {
        let (ratings, _) = scenario();
        let counts = popularity(&ratings);

        assert_eq!(counts.get(&1), Some(&1));
        assert_eq!(counts.get(&2), Some(&1));
        assert_eq!(counts.get(&3), None);
    }

    #[test]
    fn release_dates() {
        assert_eq!(
            parse_release_date("24-Jan-1997"),
            NaiveDate::from_ymd_opt(1997, 1, 24)
        );
        assert_eq!(parse_release_date(""), None);
        assert_eq!(parse_release_date("sometime in 1997"), None);

        let item = Item::new(267, "unknown").release_date(parse_release_date(""));
        assert_eq!(item.release_year(), None);
    }

    #[test]
    fn max_ids_of_rows() {
        let (ratings, _) = scenario();

        assert_eq!(max_ids(&ratings), Some((10, 2)));
        assert_eq!(max_ids::<Rating>(&[]), None);
    }

    #[test]
    fn split_rejects_bad_fractions() {
        let (ratings, _) = scenario();

        for &fraction in &[0.0, 1.0, -0.5, 1.5, std::f32::NAN] {
            assert!(match train_test_split(&ratings, fraction, 42) {
                Err(FittingError::InvalidConfiguration(_)) => true,
                _ => false,
            });
            assert!(user_based_split(&ratings, fraction, 42).is_err());
        }
    }

    #[test]
    fn split_sizes() {
        let ratings: Vec<_> = (0..10).map(|i| Rating::new(i, i, 3, i)).collect();
        let (train, test) = train_test_split(&ratings, 0.2, 42).unwrap();

        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let (train, test) = train_test_split(&ratings, 0.25, 42).unwrap();

        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 3);

        let rows: Vec<usize> = (0..100).collect();
        assert_eq!(train_test_split(&rows, 0.3, 42).unwrap().1.len(), 30);
        assert_eq!(train_test_split(&rows[..50], 0.3, 42).unwrap().1.len(), 15);
    }

    #[test]
    fn counts_match_exact_decimal_fractions() {
        for tenths in 1..10usize {
            let fraction = tenths as f32 / 10.0;

            for len in 0..5000 {
                assert_eq!(ceil_count(fraction, len), (tenths * len + 9) / 10);
                assert_eq!(floor_count(fraction, len), tenths * len / 10);
            }
        }

        assert_eq!(ceil_count(0.25, 10), 3);
        assert_eq!(ceil_count(0.01, 1), 1);
        assert_eq!(floor_count(0.99, 1), 0);
    }

    #[test]
    fn user_split_keeps_users_together() {
        let ratings: Vec<_> = (0..2000)
            .map(|i| Rating::new(i % 200, i % 37, 4, i))
            .collect();

        let (train, test) = user_based_split(&ratings, 0.2, 7).unwrap();
        let (train_again, test_again) = user_based_split(&ratings, 0.2, 7).unwrap();
        let (other_train, _) = user_based_split(&ratings, 0.2, 8).unwrap();

        assert_eq!(train, train_again);
        assert_eq!(test, test_again);
        assert_ne!(train, other_train);

        let train_users: HashSet<_> = train.iter().map(|x| x.user_id()).collect();
        let test_users: HashSet<_> = test.iter().map(|x| x.user_id()).collect();

        assert_eq!(train.len() + test.len(), ratings.len());
        assert!(train_users.is_disjoint(&test_users));
        assert!(!test_users.is_empty());
        assert!(!train_users.is_empty());
    }

    fn arb_ratings() -> impl Strategy<Value = Vec<Rating>> {
        prop::collection::vec((1usize..50, 1usize..30, 1u8..6), 1..200).prop_map(|triples| {
            triples
                .into_iter()
                .enumerate()
                .map(|(timestamp, (user_id, item_id, rating))| {
                    Rating::new(user_id, item_id, rating, timestamp)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn split_is_a_deterministic_partition(
            ratings in arb_ratings(),
            fraction in 0.01f32..0.99,
            seed in any::<u64>(),
        ) {
            let (train, test) = train_test_split(&ratings, fraction, seed).unwrap();
            let (train_again, test_again) = train_test_split(&ratings, fraction, seed).unwrap();

            prop_assert_eq!(&train, &train_again);
            prop_assert_eq!(&test, &test_again);

            // Timestamps are unique, so they identify rows.
            let train_rows: HashSet<_> = train.iter().map(|x| x.timestamp()).collect();
            let test_rows: HashSet<_> = test.iter().map(|x| x.timestamp()).collect();
            let all_rows: HashSet<_> = ratings.iter().map(|x| x.timestamp()).collect();

            prop_assert!(train_rows.is_disjoint(&test_rows));
            prop_assert_eq!(train_rows.union(&test_rows).cloned().collect::<HashSet<_>>(), all_rows);
            prop_assert_eq!(train.len() + test.len(), ratings.len());
        }

        #[test]
        fn join_never_grows(ratings in arb_ratings(), known in prop::collection::hash_set(1usize..30, 0..15)) {
            let items: Vec<_> = known.iter().map(|&id| Item::new(id, format!("item {}", id))).collect();
            let rows = join(&ratings, &items);

            let expected = ratings.iter().filter(|x| known.contains(&x.item_id())).count();

            prop_assert!(rows.len() <= ratings.len());
            prop_assert_eq!(rows.len(), expected);
            prop_assert!(rows.iter().all(|row| known.contains(&row.item_id())));
        }
    }
}
