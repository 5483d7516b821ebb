//! Benchmark utilities and helpers.

use nexus_memdb::Database;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rows per generated INSERT statement.
const INSERT_BATCH: usize = 500;

/// Generates random string data for benchmarks.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates random user records as `(id, name, age)`.
pub fn generate_user_records(count: usize) -> Vec<(i64, String, i64)> {
    let mut rng = StdRng::seed_from_u64(42);
    let names = [
        "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry",
    ];

    (1..=count as i64)
        .map(|id| {
            let name_idx = rng.gen_range(0..names.len());
            let suffix = random_string(&mut rng, 4);
            let name = format!("{}_{}", names[name_idx], suffix);
            let age = rng.gen_range(18..80);
            (id, name, age)
        })
        .collect()
}

/// Creates `users (id, name, age)` holding `count` generated rows, with
/// an index on `age` when `index_age` is set.
///
/// # Panics
///
/// Panics if any statement fails.
pub fn users_db(count: usize, index_age: bool) -> Database {
    let db = Database::new();
    db.execute_none("CREATE TABLE users (id int PRIMARY KEY, name text, age int)")
        .expect("CREATE failed");
    if index_age {
        db.execute_none("CREATE INDEX users_age ON users (age)")
            .expect("CREATE INDEX failed");
    }
    insert_users(&db, &generate_user_records(count));
    db
}

/// Adds `orders (id, user_id, total)` with `per_user` orders for each of
/// the first `users` user ids.
///
/// # Panics
///
/// Panics if any statement fails.
pub fn add_orders(db: &Database, users: usize, per_user: usize) {
    db.execute_none("CREATE TABLE orders (id serial PRIMARY KEY, user_id int, total int)")
        .expect("CREATE failed");
    let mut rng = StdRng::seed_from_u64(7);
    let rows: Vec<String> = (1..=users)
        .flat_map(|user| (0..per_user).map(move |_| user))
        .map(|user| format!("({}, {})", user, rng.gen_range(1..500)))
        .collect();
    for chunk in rows.chunks(INSERT_BATCH) {
        db.execute_none(&format!(
            "INSERT INTO orders (user_id, total) VALUES {}",
            chunk.join(", ")
        ))
        .expect("INSERT failed");
    }
}

fn insert_users(db: &Database, records: &[(i64, String, i64)]) {
    for chunk in records.chunks(INSERT_BATCH) {
        let values: Vec<String> = chunk
            .iter()
            .map(|(id, name, age)| format!("({}, '{}', {})", id, name, age))
            .collect();
        db.execute_none(&format!("INSERT INTO users VALUES {}", values.join(", ")))
            .expect("INSERT failed");
    }
}
