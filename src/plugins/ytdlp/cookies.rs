/// How a user-supplied cookie value is handed to yt-dlp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieForm {
    /// Netscape cookie-jar text, written to a file for `--cookies`.
    Jar(String),
    /// A `name=value; ...` string sent as a request header.
    Header(String),
}

pub fn is_netscape_jar(raw: &str) -> bool {
    let head = raw.trim_start();
    raw.contains('\t') || head.starts_with("# Netscape") || head.starts_with("# HTTP Cookie")
}

pub fn classify(raw: &str) -> CookieForm {
    if is_netscape_jar(raw) {
        CookieForm::Jar(repair_jar(raw))
    } else {
        CookieForm::Header(raw.trim().to_string())
    }
}

/// Pasted jars often lose their tabs. A data line with at least seven
/// whitespace-separated tokens is rebuilt as six tab-separated fields plus
/// the value (the remaining tokens joined by a space).
pub fn repair_jar(text: &str) -> String {
    let mut out: Vec<String> = text
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || line.contains('\t') {
                return line.to_string();
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.len() < 7 {
                return line.to_string();
            }
            format!("{}\t{}", tokens[..6].join("\t"), tokens[6..].join(" "))
        })
        .collect();
    // yt-dlp expects a trailing newline
    out.push(String::new());
    out.join("\n")
}
