use crate::attributes::AttributeSet;
use crate::trainer::EpochRecord;

/// Render a series as an ASCII chart.
pub fn plot_series(values: &[f32], title: &str, width: usize, height: usize) -> String {
    if values.is_empty() || width < 10 || height < 5 {
        return format!("{}: no data", title);
    }

    let min_val = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max_val = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    if (max_val - min_val).abs() < f32::EPSILON {
        return format!("{}: all {} values are {:.4}", title, values.len(), min_val);
    }

    let mut plot = vec![vec![' '; width]; height];

    for row in plot.iter_mut() {
        row[0] = '|';
    }
    for cell in plot[height - 1].iter_mut() {
        *cell = '-';
    }
    plot[height - 1][0] = '+';

    let x_scale = if values.len() > 1 { (width - 3) as f32 / (values.len() - 1) as f32 } else { 0.0 };
    let y_scale = (height - 2) as f32 / (max_val - min_val);

    for (i, &value) in values.iter().enumerate() {
        let x = ((i as f32 * x_scale) as usize + 2).min(width - 1);
        let level = ((value - min_val) * y_scale) as usize;
        let y = (height - 2).saturating_sub(level);
        plot[y][x] = '*';
    }

    let mut output = format!("{}\n", title);
    output.push_str(&format!("Max: {:.4}\n", max_val));
    for row in plot.iter() {
        output.push_str(&row.iter().collect::<String>());
        output.push('\n');
    }
    output.push_str(&format!("Min: {:.4}\n", min_val));
    output.push_str(&format!("Points: {}\n", values.len()));
    output
}

/// One-line description of an epoch for the log.
pub fn epoch_summary(record: &EpochRecord, attributes: &AttributeSet) -> String {
    let per_attr = attributes
        .named(&record.accuracy)
        .map(|(name, acc)| format!("{}={:.2}%", name, acc))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "epoch {} | loss {:.4} ({:.4}/sample) | val {:.2}% [{}]{}",
        record.epoch,
        record.train_loss,
        record.train_loss_per_sample,
        record.mean_accuracy,
        per_attr,
        if record.improved { " *" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_series_marks_every_point() {
        let plot = plot_series(&[3.0, 2.0, 1.0, 0.5], "Loss", 20, 8);
        assert!(plot.starts_with("Loss\nMax: 3.0000\n"));
        assert_eq!(plot.matches('*').count(), 4);
        assert!(plot.contains("Points: 4"));
    }

    #[test]
    fn test_plot_series_degenerate_inputs() {
        assert_eq!(plot_series(&[], "Loss", 20, 8), "Loss: no data");
        assert_eq!(plot_series(&[1.0, 1.0], "Acc", 20, 8), "Acc: all 2 values are 1.0000");
        assert_eq!(plot_series(&[1.0], "Acc", 20, 8), "Acc: all 1 values are 1.0000");
    }
}
