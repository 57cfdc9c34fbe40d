use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets};

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The duality-gap criterion was met.
    Converged,
    /// The iteration budget ran out; the iterate is feasible but not optimal.
    MaxIterations,
    /// Numerical divergence was detected; the last stable iterate is kept.
    Diverged,
}

/// Summary statistics for a finished solve.
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub status: SolveStatus,
    pub iterations: usize,
    /// Final primal objective (loss plus penalty).
    pub primal: f64,
    /// Final duality gap.
    pub dual_gap: f64,
    /// Learning rate at termination.
    pub learning_rate: f64,
}

/// Per-iteration diagnostics handed to a [`Reporter`].
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    pub primal: f64,
    pub dual: f64,
    pub dual_gap: f64,
    pub learning_rate: f64,
    /// Whether momentum was restarted this iteration.
    pub restarted: bool,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub trait Reporter {
    fn on_iteration(&mut self, report: &IterationReport);
    fn on_finish(&mut self) {}
}

/// Collects iteration reports and renders them as a table on finish.
pub struct StdoutReporter {
    rows: Vec<IterationReport>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("primal").set_alignment(CellAlignment::Right),
            Cell::new("dual").set_alignment(CellAlignment::Right),
            Cell::new("gap").set_alignment(CellAlignment::Right),
            Cell::new("lr").set_alignment(CellAlignment::Right),
            Cell::new("restart"),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.6e}", row.primal)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.6e}", row.dual)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2e}", row.dual_gap)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.learning_rate)).set_alignment(CellAlignment::Right),
                Cell::new(if row.restarted { "yes" } else { "no" }),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        self.rows.clear();
    }
}
