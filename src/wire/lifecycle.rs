/// The lifecycle endpoint wraps the event log between the second and third
/// `|` of its response body; anything shorter yields an empty log.
pub fn extract_lifecycle(body: &str) -> String {
    body.split('|').nth(2).unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::extract_lifecycle;

    #[test]
    fn extracts_between_second_and_third_pipe() {
        let body = "1234|Ok|received*3/1/2024 10:00:00 AM*10:00,allocated*Dan*10:05|tail";
        assert_eq!(
            extract_lifecycle(body),
            "received*3/1/2024 10:00:00 AM*10:00,allocated*Dan*10:05"
        );
    }

    #[test]
    fn missing_delimiters_yield_empty() {
        assert_eq!(extract_lifecycle("no pipes here"), "");
        assert_eq!(extract_lifecycle("one|pipe"), "");
    }
}
