//! TXT record and query name helpers

/// Version tag carried by DNS3 TXT answers.
pub const TXT_VERSION: &str = "v=tox3";

/// Part of a TXT answer handed to the decrypt primitive.
///
/// Accepts a full answer such as `"v=tox3;id=XXXX"` (quoted or not) and returns
/// `XXXX`; anything without an `id=` field is assumed to be the bare record.
pub fn extract_record_id(txt: &str) -> &str {
    let txt = txt.trim().trim_matches('"');
    txt.split(';')
        .map(str::trim)
        .find_map(|field| field.strip_prefix("id="))
        .unwrap_or(txt)
}

/// Whether `txt` declares the DNS3 version. Bare records carry no version.
pub fn is_dns3_answer(txt: &str) -> bool {
    txt.trim()
        .trim_matches('"')
        .split(';')
        .any(|field| field.trim() == TXT_VERSION)
}

/// `_<label>._tox.<domain>`
pub fn query_name(label: &str, domain: &str) -> String {
    format!("_{}._tox.{}", label, domain.trim_matches('.'))
}

/// Recover the generated label from a full query name; bare labels pass through.
pub fn query_label(query: &str) -> &str {
    let query = query.trim();
    let query = query.strip_prefix('_').unwrap_or(query);
    query.split("._tox").next().unwrap_or(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_field() {
        assert_eq!(extract_record_id("v=tox3;id=ABCDEF"), "ABCDEF");
        assert_eq!(extract_record_id("\"v=tox3; id=ABCDEF\""), "ABCDEF");
        assert_eq!(extract_record_id("ABCDEF"), "ABCDEF");
    }

    #[test]
    fn recognises_version() {
        assert!(is_dns3_answer("v=tox3;id=AB"));
        assert!(!is_dns3_answer("v=tox1;id=AB"));
        assert!(!is_dns3_answer("AB"));
    }

    #[test]
    fn query_names_roundtrip() {
        let name = query_name("abc.def", "toxme.io.");
        assert_eq!(name, "_abc.def._tox.toxme.io");
        assert_eq!(query_label(&name), "abc.def");
        assert_eq!(query_label("abc"), "abc");
    }
}
