pub const FILE_SEPARATOR: char = ':';
pub const KEY_SEPARATOR: char = '.';

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut rest = key;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        let decoded = match tail.get(..3) {
            Some("%25") => Some('%'),
            Some("%2E") => Some('.'),
            Some("%3A") => Some(':'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn join_keys<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|k| escape_key(k.as_ref()))
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}

pub fn join_column_path<S: AsRef<str>>(segments: &[S]) -> String {
    match segments {
        [] => String::new(),
        [category] => category.as_ref().to_string(),
        [category, file] => format!("{}{}{}", category.as_ref(), FILE_SEPARATOR, file.as_ref()),
        [category, file, keys @ ..] => format!(
            "{}{}{}{}{}",
            category.as_ref(),
            FILE_SEPARATOR,
            file.as_ref(),
            FILE_SEPARATOR,
            join_keys(keys)
        ),
    }
}

pub fn append_column_path<S: AsRef<str>>(path: &str, segments: &[S]) -> String {
    if segments.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return join_column_path(segments);
    }
    match path.matches(FILE_SEPARATOR).count() {
        0 => {
            let Some((file, keys)) = segments.split_first() else {
                return path.to_string();
            };
            if keys.is_empty() {
                format!("{}{}{}", path, FILE_SEPARATOR, file.as_ref())
            } else {
                format!(
                    "{}{}{}{}{}",
                    path,
                    FILE_SEPARATOR,
                    file.as_ref(),
                    FILE_SEPARATOR,
                    join_keys(keys)
                )
            }
        }
        1 => format!("{}{}{}", path, FILE_SEPARATOR, join_keys(segments)),
        _ => format!("{}{}{}", path, KEY_SEPARATOR, join_keys(segments)),
    }
}

pub fn split_column_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let Some((category, rest)) = path.split_once(FILE_SEPARATOR) else {
        return vec![path.to_string()];
    };
    let Some((file, keys)) = rest.rsplit_once(FILE_SEPARATOR) else {
        return vec![category.to_string(), rest.to_string()];
    };
    let mut out = vec![category.to_string(), file.to_string()];
    out.extend(keys.split(KEY_SEPARATOR).map(unescape_key));
    out
}
