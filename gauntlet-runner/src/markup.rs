//! Minimal row/cell extraction for the terminal's spreadsheet-markup
//! artifacts.
//!
//! Both report flavors (sweep tables and single-run reports) are sequences
//! of `<Row>` elements whose `<Data>` children carry the cell text. This
//! module pulls those out, tolerating namespace prefixes on element names.
//! It is deliberately not a general XML parser.

/// Extract every row as a vector of unescaped cell strings.
pub fn rows(xml: &str) -> Vec<Vec<String>> {
    split_elements(xml, "Row")
        .into_iter()
        .map(|row_body| {
            split_elements(&row_body, "Data")
                .into_iter()
                .map(|cell| unescape(cell.trim()))
                .collect()
        })
        .collect()
}

/// Bodies of every `<name>…</name>` element, in document order.
fn split_elements(text: &str, name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    loop {
        let Some(open_at) = find_open(rest, name) else { break };
        let Some(gt) = rest[open_at..].find('>') else { break };
        if rest[open_at..open_at + gt].ends_with('/') {
            // self-closing: empty body
            out.push(String::new());
            rest = &rest[open_at + gt + 1..];
            continue;
        }
        let body_start = open_at + gt + 1;
        let Some(close_at) = find_close(&rest[body_start..], name) else { break };
        out.push(rest[body_start..body_start + close_at].to_string());
        let after = &rest[body_start + close_at..];
        rest = match after.find('>') {
            Some(i) => &after[i + 1..],
            None => "",
        };
    }
    out
}

/// Offset of the next `<name…>` or `<prefix:name…>` opening tag.
fn find_open(text: &str, name: &str) -> Option<usize> {
    let mut from = 0;
    loop {
        let at = text[from..].find('<')? + from;
        let tag = &text[at + 1..];
        if tag_matches(tag, name) {
            return Some(at);
        }
        from = at + 1;
    }
}

/// Offset of the next `</name>` or `</prefix:name>` closing tag.
fn find_close(text: &str, name: &str) -> Option<usize> {
    let mut from = 0;
    loop {
        let at = text[from..].find("</")? + from;
        if tag_matches(&text[at + 2..], name) {
            return Some(at);
        }
        from = at + 2;
    }
}

/// Does `tag` (text just after `<` or `</`) name this element, with an
/// optional short namespace prefix?
fn tag_matches(tag: &str, name: &str) -> bool {
    let bare = tag.strip_prefix(name).map_or(false, tag_name_ended);
    if bare {
        return true;
    }
    match tag.find(':') {
        Some(colon) if colon < 12 && tag[..colon].chars().all(|c| c.is_ascii_alphanumeric()) => tag
            [colon + 1..]
            .strip_prefix(name)
            .map_or(false, tag_name_ended),
        _ => false,
    }
}

fn tag_name_ended(rest: &str) -> bool {
    rest.starts_with('>') || rest.starts_with(' ') || rest.starts_with('/')
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rows_and_cells() {
        let xml = "<Table><Row><Cell><Data>Pass</Data></Cell><Cell><Data>1</Data></Cell></Row>\
                   <Row><Cell><Data>Profit</Data></Cell><Cell><Data>250.5</Data></Cell></Row></Table>";
        let rows = rows(xml);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["Pass".to_string(), "1".to_string()]);
        assert_eq!(rows[1][1], "250.5");
    }

    #[test]
    fn namespace_prefixes_tolerated() {
        let xml = "<ss:Row><ss:Cell><ss:Data ss:Type=\"Number\">42</ss:Data></ss:Cell></ss:Row>";
        let rows = rows(xml);
        assert_eq!(rows, vec![vec!["42".to_string()]]);
    }

    #[test]
    fn entities_unescaped() {
        let xml = "<Row><Data>a &amp; b</Data></Row>";
        assert_eq!(rows(xml)[0][0], "a & b");
    }

    #[test]
    fn attribute_with_colon_does_not_confuse_matcher() {
        let xml = "<Worksheet ss:Name=\"Sheet1\"><Row><Data>x</Data></Row></Worksheet>";
        assert_eq!(rows(xml), vec![vec!["x".to_string()]]);
    }

    #[test]
    fn no_rows_yields_empty() {
        assert!(rows("<Workbook></Workbook>").is_empty());
    }
}
