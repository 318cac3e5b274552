use std::sync::Arc;

use crate::migrators::Migrator;

/// Title for the pull request proposing the migrated configuration.
pub fn pull_request_title(applied: &[Arc<dyn Migrator>]) -> String {
    match applied {
        [only] => format!("Update Read the Docs configuration: {}", only.title()),
        _ => "Update Read the Docs configuration".to_string(),
    }
}

/// Body listing each applied migrator's title and description.
pub fn pull_request_body(applied: &[Arc<dyn Migrator>]) -> String {
    let mut body = String::from(
        "This pull request updates the Read the Docs configuration file \
         to replace deprecated settings with their current equivalents.\n\n\
         Applied migrations:\n\n",
    );
    for migrator in applied {
        body.push_str(&format!(
            "- **{}** (`{}`): {}\n",
            migrator.title(),
            migrator.name(),
            migrator.description()
        ));
    }
    body.push_str("\nOpened automatically by rtd-config-assistant.\n");
    body
}

/// Commit message for the configuration update.
pub fn commit_message(path: &str, applied: &[Arc<dyn Migrator>]) -> String {
    let names: Vec<&str> = applied.iter().map(|m| m.name()).collect();
    format!("Update {} ({})", path, names.join(", "))
}

/// Line-oriented diff between two texts, in the classic two-column marker
/// style: unchanged lines prefixed with two spaces, removals with `- `,
/// additions with `+ `.
pub fn line_diff(old: &str, new: &str) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    // Longest-common-subsequence table over lines.
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push_str("  ");
            out.push_str(a[i]);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push_str("- ");
            out.push_str(a[i]);
            i += 1;
        } else {
            out.push_str("+ ");
            out.push_str(b[j]);
            j += 1;
        }
        out.push('\n');
    }
    for line in &a[i..] {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    for line in &b[j..] {
        out.push_str("+ ");
        out.push_str(line);
        out.push('\n');
    }
    out
}
