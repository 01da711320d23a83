use comfy_table::{presets::NOTHING, *};
use footprint::{
    loader::{BatchOutcome, ItemOutcome},
    pipeline::{LoadOutcome, RunSummary},
};

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_run_summary(summary: &RunSummary) {
    let mut table = styled_table(&["Snapshot", "Rows", "File"]);
    for (name, published) in &summary.tables {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(published.rows).set_alignment(CellAlignment::Right),
            Cell::new(published.file.display()),
        ]);
    }
    for name in &summary.skipped {
        table.add_row(vec![Cell::new(name), Cell::new("-"), Cell::new("skipped")]);
    }
    println!("\n{}", table);
}

fn display_items(kind: &str, items: &[ItemOutcome]) {
    if items.is_empty() {
        return;
    }
    let mut table = styled_table(&[kind, "Status"]);
    for item in items {
        table.add_row(vec![item.name.clone(), item.status.to_string()]);
    }
    println!("\n{}", table);
}

pub fn display_load_outcome(outcome: &LoadOutcome) {
    let report = &outcome.report;
    let mut table = styled_table(&["Table", "Mode", "Rows", "Skipped", "Status"]);
    for (name, import) in &report.tables {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(import.mode),
            Cell::new(import.rows).set_alignment(CellAlignment::Right),
            Cell::new(import.skipped).set_alignment(CellAlignment::Right),
            Cell::new(&import.status),
        ]);
    }
    println!("\n{}", table);

    match &report.outcome {
        BatchOutcome::Committed => println!("\nBatch committed"),
        BatchOutcome::Independent => println!("\nTables imported independently"),
        BatchOutcome::RolledBack { table, reason } => {
            println!("\nBatch rolled back at {table}: {reason}")
        }
    }
    display_items("Index", &outcome.indexes);
    display_items("View", &outcome.views);
}
