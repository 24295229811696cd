use tracing::debug;

use crate::models::courier::Courier;
use crate::wire::{Field, RowSchema, ROW_SEPARATOR};

// The directory row carries a password hash at index 3; it is positional
// padding as far as this app is concerned and is never read.
pub static DIRECTORY_SCHEMA: RowSchema = RowSchema {
    name: "courier",
    min_fields: 5,
    fields: &[
        Field::at("name", 0),
        Field::at("email", 1),
        Field::at("phone", 2),
        Field::at("id", 4),
    ],
};

pub fn decode_directory(body: &str) -> Vec<Courier> {
    body.split(ROW_SEPARATOR)
        .filter(|row| !row.trim().is_empty())
        .filter_map(|row| match DIRECTORY_SCHEMA.decode(row) {
            Ok(decoded) => Some(Courier {
                id: decoded.str_at("id"),
                name: decoded.str_at("name"),
                email: decoded.str_at("email"),
                phone: decoded.str_at("phone"),
            }),
            Err(err) => {
                debug!(error = %err, "dropping malformed courier row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::decode_directory;

    #[test]
    fn decodes_directory_rows() {
        let body = "Dan Smith|dan@example.com|07700900001|x|7$Priya Patel|priya@example.com|07700900002|y|9";
        let couriers = decode_directory(body);
        assert_eq!(couriers.len(), 2);
        assert_eq!(couriers[0].id, "7");
        assert_eq!(couriers[0].name, "Dan Smith");
        assert_eq!(couriers[1].phone, "07700900002");
    }

    #[test]
    fn short_rows_are_skipped() {
        let couriers = decode_directory("just|three|fields$Dan|d@e.com|077|x|7");
        assert_eq!(couriers.len(), 1);
        assert_eq!(couriers[0].id, "7");
    }
}
