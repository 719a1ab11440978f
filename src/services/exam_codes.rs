use std::collections::HashSet;

use rand::Rng;
use sqlx::PgConnection;
use time::PrimitiveDateTime;

use crate::repositories;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub(crate) const CODE_LENGTH: usize = 8;

/// Draws codes until one is absent from `in_use`. Codes are upper-case, so callers
/// must normalize before inserting into or probing the set.
pub(crate) fn generate_unique(in_use: &HashSet<String>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let candidate = generate_with(&mut rng);
        if !in_use.contains(&candidate) {
            return candidate;
        }
    }
}

fn generate_with(rng: &mut impl Rng) -> String {
    let mut output = String::with_capacity(CODE_LENGTH);
    for _ in 0..CODE_LENGTH {
        let index = rng.gen_range(0..ALPHABET.len());
        output.push(ALPHABET[index] as char);
    }
    output
}

pub(crate) fn matches(stored: Option<&str>, supplied: &str) -> bool {
    match stored {
        Some(stored) => !stored.is_empty() && stored.eq_ignore_ascii_case(supplied.trim()),
        None => false,
    }
}

/// Every code currently stored on a final exam or one of its partials.
pub(crate) async fn load_in_use(conn: &mut PgConnection) -> Result<HashSet<String>, sqlx::Error> {
    let mut in_use: HashSet<String> = repositories::partials::list_exam_codes(&mut *conn)
        .await?
        .into_iter()
        .map(|code| code.to_ascii_uppercase())
        .collect();
    in_use.extend(
        repositories::final_exams::list_exam_codes(&mut *conn)
            .await?
            .into_iter()
            .map(|code| code.to_ascii_uppercase()),
    );
    Ok(in_use)
}

/// Replaces the partial's access code with a fresh one and returns it.
pub(crate) async fn rotate_partial_code(
    conn: &mut PgConnection,
    partial_id: i64,
    now: PrimitiveDateTime,
) -> Result<String, sqlx::Error> {
    let in_use = load_in_use(&mut *conn).await?;
    let code = generate_unique(&in_use);
    repositories::partials::set_exam_code(&mut *conn, partial_id, &code, now).await?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_codes_use_the_alphabet() {
        let code = generate_unique(&HashSet::new());
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|byte| ALPHABET.contains(&byte)));
    }

    #[test]
    fn collisions_are_retried() {
        let mut seeded = StdRng::seed_from_u64(7);
        let first = generate_with(&mut seeded);

        let mut in_use = HashSet::new();
        in_use.insert(first.clone());
        for _ in 0..50 {
            assert_ne!(generate_unique(&in_use), first);
        }
    }

    #[test]
    fn matching_ignores_case_and_padding() {
        assert!(matches(Some("AB12CD34"), "ab12cd34"));
        assert!(matches(Some("AB12CD34"), " AB12CD34 "));
        assert!(!matches(Some("AB12CD34"), "AB12CD35"));
        assert!(!matches(None, "AB12CD34"));
        assert!(!matches(Some(""), ""));
    }
}
