use archipelago::engine::SimStatus;
use archipelago::expr::{PayoffRange, Program};
use archipelago::snapshot::Snapshot;
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

fn right_align(table: &mut Table, from: usize, to: usize) {
    for i in from..=to {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
}

/// Per-incumbent outcome table.
pub fn print_outcome_report(snap: &Snapshot) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        Cell::new("Incumbent").add_attribute(Attribute::Bold),
        Cell::new("Trials"),
        Cell::new("Mean").fg(Color::Cyan),
        Cell::new("StdDev"),
        Cell::new("Mut Ext").fg(Color::Red),
        Cell::new("Inc Ext").fg(Color::Green),
        Cell::new("Fit"),
    ]);
    right_align(&mut table, 1, 6);

    for i in 0..snap.slices {
        let fitted = snap
            .fit
            .as_ref()
            .map(|f| format!("{:.4}", f.eval(snap.strategies[i])))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(format!("{:.4}", snap.strategies[i])).add_attribute(Attribute::Bold),
            Cell::new(snap.samples[i]),
            Cell::new(format!("{:.4}", snap.mean[i])).fg(Color::Cyan),
            Cell::new(format!("{:.4}", snap.stddev[i])),
            Cell::new(format!("{:.3}", snap.mutant_extinction[i])).fg(Color::Red),
            Cell::new(format!("{:.3}", snap.incumbent_extinction[i])).fg(Color::Green),
            Cell::new(fitted),
        ]);
    }
    println!("\n{}", table);

    if let Some(fit) = &snap.fit {
        let terms: Vec<String> = fit
            .coefficients
            .iter()
            .enumerate()
            .map(|(p, c)| match p {
                0 => format!("{:.4}", c),
                1 => format!("{:+.4} x", c),
                _ => format!("{:+.4} x^{}", c, p),
            })
            .collect();
        println!("Fit: {}", terms.join(" "));
        println!(
            "Fit minimum: {:.4} at incumbent {:.4}",
            fit.minimum_y, fit.minimum_x
        );
    }
}

/// Mean outcome by incumbent (rows) and seeding island (columns).
pub fn print_island_report(snap: &Snapshot) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("Incumbent").add_attribute(Attribute::Bold)];
    header.extend((0..snap.islands).map(|j| Cell::new(format!("I{}", j))));
    table.add_row(header);
    right_align(&mut table, 1, snap.islands);

    for i in 0..snap.slices {
        let mut row = vec![Cell::new(format!("{:.4}", snap.strategies[i]))];
        row.extend(
            snap.island_mean[i * snap.islands..(i + 1) * snap.islands]
                .iter()
                .map(|m| Cell::new(format!("{:.4}", m))),
        );
        table.add_row(row);
    }
    println!("\n{}", table);
}

pub fn print_status(status: &SimStatus) {
    println!(
        "State: {} | trials {} | generations {}",
        status.state, status.trials, status.generations
    );
    if let Some(fault) = &status.fault {
        println!("Fault: {}", fault);
    }
}

pub fn print_payoff_report(program: &Program, range: Option<&PayoffRange>) {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);

    table.add_row(vec![
        Cell::new("").add_attribute(Attribute::Bold),
        Cell::new("Payoff").fg(Color::Cyan),
        Cell::new("x"),
        Cell::new("X"),
        Cell::new("n"),
    ]);
    right_align(&mut table, 1, 4);

    if let Some(r) = range {
        for (label, value, at) in [("min", r.min, r.argmin), ("max", r.max, r.argmax)] {
            table.add_row(vec![
                Cell::new(label).add_attribute(Attribute::Bold),
                Cell::new(format!("{:.6}", value)).fg(Color::Cyan),
                Cell::new(format!("{:.4}", at.0)),
                Cell::new(format!("{:.4}", at.1)),
                Cell::new(format!("{:.0}", at.2)),
            ]);
        }
    }

    println!("Postfix: {}", program);
    println!("{}", table);
}
