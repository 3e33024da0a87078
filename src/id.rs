use ulid::Ulid;

pub fn new_ulid_string() -> String {
    Ulid::new().to_string()
}
