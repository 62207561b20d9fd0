//! DENCLUE on a simple 2D dataset with caller-supplied row ids and domains.

use denclue::{AxisDomain, Denclue, Label};

fn main() {
    // Two tight groups and a few scattered points in [0, 10] x [0, 10].
    let points: Vec<(f32, f32)> = vec![
        // Group A (near (1, 1))
        (1.0, 1.0),
        (1.1, 1.2),
        (1.2, 1.1),
        (0.9, 1.1),
        (1.05, 0.95),
        // Group B (near (7, 3))
        (7.0, 3.0),
        (7.1, 2.9),
        (6.9, 3.1),
        (7.2, 3.2),
        // Scattered
        (4.0, 8.0),
        (9.5, 9.5),
        (2.5, 6.0),
    ];

    let domains = vec![AxisDomain::new(0.0, 10.0); 2];
    let rows = points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| (format!("Row{i}"), vec![x, y]));

    let fit = Denclue::new(0.3, 0.3).fit(&domains, rows).unwrap();

    println!("=== DENCLUE (sigma=0.3, xi=0.3) ===");
    for (i, &(x, y)) in points.iter().enumerate() {
        let id = format!("Row{i}");
        let label = fit.label(&id).unwrap_or(Label::Noise);
        println!("  {id:6} ({x:5.2}, {y:5.2}) => {label}");
    }

    println!("\n=== Summary ===");
    for (label, count) in fit.summary_table() {
        println!("  {label:10} {count}");
    }
    for summary in fit.summaries() {
        println!(
            "  cluster {} attractor {:?} density {:.3}",
            summary.index, summary.attractor, summary.density
        );
    }
}
