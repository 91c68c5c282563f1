//! Human-readable meal tokens.
//!
//! Format: `{prefix}-{DDMMYY}-{id suffix}-{NN}`, e.g. `B-210225-f7a2-84`.
//! Tokens are display labels. The two-digit random part collides easily, so
//! a token must never be used as a lookup key.

use chrono::NaiveDate;
use rand::Rng;
use tokenless_common::MealType;

/// Build the token for a `meal_type` request by `student_id` on `date`.
pub fn generate_token_id<R: Rng + ?Sized>(
    meal_type: MealType,
    student_id: &str,
    date: NaiveDate,
    rng: &mut R,
) -> String {
    let date_code = date.format("%d%m%y");
    let random: u8 = rng.gen_range(0..100);
    format!(
        "{}-{}-{}-{:02}",
        meal_type.prefix(),
        date_code,
        id_suffix(student_id),
        random
    )
}

/// Last four characters of the id, lowercased (the whole id if shorter).
fn id_suffix(student_id: &str) -> String {
    let chars: Vec<char> = student_id.chars().collect();
    let start = chars.len().saturating_sub(4);
    chars[start..].iter().collect::<String>().to_lowercase()
}

/// Calendar-day key used for the one-pending-per-day rule.
pub fn day_bucket(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn feb_21() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 21).unwrap()
    }

    fn matches_format(token: &str) -> bool {
        let parts: Vec<&str> = token.split('-').collect();
        parts.len() == 4
            && matches!(parts[0], "B" | "L" | "D")
            && parts[1].len() == 6
            && parts[1].chars().all(|c| c.is_ascii_digit())
            && (1..=4).contains(&parts[2].chars().count())
            && parts[3].len() == 2
            && parts[3].chars().all(|c| c.is_ascii_digit())
    }

    #[rstest]
    #[case(MealType::Breakfast, "u-abcd1234", "B-210225-1234-")]
    #[case(MealType::Lunch, "XYZ9F7A2", "L-210225-f7a2-")]
    #[case(MealType::Dinner, "abc", "D-210225-abc-")]
    fn test_token_prefix(#[case] meal: MealType, #[case] student: &str, #[case] expected: &str) {
        let mut rng = StdRng::seed_from_u64(7);
        let token = generate_token_id(meal, student, feb_21(), &mut rng);
        assert!(token.starts_with(expected), "{token}");
        assert!(matches_format(&token), "{token}");
    }

    #[test]
    fn test_date_code_is_zero_padded() {
        let mut rng = StdRng::seed_from_u64(1);
        let date = NaiveDate::from_ymd_opt(2007, 3, 5).unwrap();
        let token = generate_token_id(MealType::Lunch, "student", date, &mut rng);
        assert!(token.starts_with("L-050307-dent-"), "{token}");
    }

    #[test]
    fn test_random_part_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let token = generate_token_id(MealType::Dinner, "s1", feb_21(), &mut rng);
            let random: u32 = token.rsplit('-').next().unwrap().parse().unwrap();
            assert!(random < 100);
            assert!(matches_format(&token), "{token}");
        }
    }

    #[test]
    fn test_id_suffix_handles_multibyte() {
        assert_eq!(id_suffix("usér-ÄBCD"), "äbcd");
        assert_eq!(id_suffix(""), "");
    }

    #[test]
    fn test_day_bucket() {
        assert_eq!(day_bucket(feb_21()), "2025-02-21");
    }
}
