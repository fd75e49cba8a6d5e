use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Fixed-width text table for the human-readable command output.
///
/// A column whose body cells are all times, phase numbers or `-` is
/// right-aligned so decimal points line up.
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing trailing cells render blank; extra cells are dropped.
    pub fn push(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let columns = self.headers.len();
        let widths: Vec<usize> = (0..columns)
            .map(|i| {
                self.rows
                    .iter()
                    .map(|r| r[i].len())
                    .fold(self.headers[i].len(), usize::max)
            })
            .collect();
        let numeric: Vec<bool> = (0..columns)
            .map(|i| !self.rows.is_empty() && self.rows.iter().all(|r| is_numeric(&r[i])))
            .collect();

        let mut out = render_line(self.headers.iter().copied(), &widths, &numeric);
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&render_line(row.iter().map(String::as_str), &widths, &numeric));
            out.push('\n');
        }
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn render_line<'a>(
    cells: impl Iterator<Item = &'a str>,
    widths: &[usize],
    numeric: &[bool],
) -> String {
    let padded: Vec<String> = cells
        .enumerate()
        .map(|(i, cell)| {
            if numeric[i] {
                format!("{cell:>w$}", w = widths[i])
            } else {
                format!("{cell:<w$}", w = widths[i])
            }
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}

fn is_numeric(cell: &str) -> bool {
    cell == "-" || (!cell.is_empty() && cell.parse::<f64>().is_ok())
}

/// Render a derived time, showing the unknown sentinel as `-`.
pub fn format_time(secs: f64) -> String {
    if secs >= tsp_core::spat::UNKNOWN {
        "-".to_string()
    } else {
        format!("{secs:.1}")
    }
}
