/// Splits a path into its components. An absolute path yields a leading
/// `"/"` component; empty components are dropped.
pub fn split_path(path: &str) -> Vec<String> {
    let mut components = Vec::new();
    if path.starts_with('/') {
        components.push("/".to_string());
    }
    components.extend(
        path.split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string()),
    );
    components
}

/// Inverse of [`split_path`].
pub fn join_path<S: AsRef<str>>(components: &[S]) -> String {
    let mut out = String::new();
    for (i, c) in components.iter().enumerate() {
        let c = c.as_ref();
        if c == "/" {
            if i == 0 {
                out.push('/');
            }
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(c);
    }
    out
}

/// Collapses repeated slashes and drops a trailing one.
pub fn normalize_path(path: &str) -> String {
    let joined = join_path(&split_path(path));
    if joined.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        joined
    }
}
