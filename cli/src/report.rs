//! Results table printed after a run.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
    Leaked,
}

impl Status {
    fn label(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Failed => "failed",
            Status::Leaked => "leaked",
        }
    }
}

/// One line of the table.
#[derive(Debug, Clone)]
pub struct Row {
    pub file: String,
    pub status: Status,
    pub regions: Option<usize>,
    /// Output path on success, the error otherwise.
    pub detail: String,
}

impl Row {
    pub fn failed(file: impl Into<String>, detail: impl ToString) -> Self {
        Row {
            file: file.into(),
            status: Status::Failed,
            regions: None,
            detail: detail.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

pub fn render(rows: &[Row]) -> String {
    let header = ["FILE", "STATUS", "REGIONS", "OUTPUT / ERROR"];
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|row| {
            [
                row.file.clone(),
                row.status.label().to_string(),
                row.regions.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                row.detail.clone(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_line = |line: [&str; 4]| {
        let _ = writeln!(
            out,
            "{:<w0$}  {:<w1$}  {:>w2$}  {}",
            line[0],
            line[1],
            line[2],
            line[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        );
    };
    push_line(header);
    for line in &cells {
        push_line([&line[0], &line[1], &line[2], &line[3]]);
    }

    let failed = rows.iter().filter(|r| !r.is_ok()).count();
    let _ = writeln!(out, "\n{} files, {} ok, {} failed", rows.len(), rows.len() - failed, failed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table() {
        let rows = vec![
            Row {
                file: "a.pdf".into(),
                status: Status::Ok,
                regions: Some(12),
                detail: "out/a_redacted.pdf".into(),
            },
            Row::failed("broken.pdf", "cannot open document"),
        ];
        let table = render(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("FILE"));
        assert!(lines[1].starts_with("a.pdf       ok"));
        assert!(lines[1].ends_with("out/a_redacted.pdf"));
        assert!(lines[2].contains("failed"));
        assert!(lines[2].contains("-  cannot open document"));
        assert!(table.ends_with("2 files, 1 ok, 1 failed\n"));
    }
}
