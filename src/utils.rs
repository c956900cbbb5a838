//! Console summaries for training runs.
use crate::network::Network;
use crate::trainer::TrainingSummary;

/// Print model summary
pub fn print_model_summary(network: &Network) {
    println!("Model Summary:\n{}", network);
}

/// Print the per-epoch accuracy and mean logged loss.
pub fn print_summary_table(summary: &TrainingSummary) {
    println!("\nTraining Summary Table:");
    println!("+-------+----------+-----------+------------+");
    println!("| Epoch | LR shift | Accuracy  | Elapsed(s) |");
    println!("+-------+----------+-----------+------------+");
    for e in &summary.epochs {
        println!(
            "| {:>5} | {:>8.2e} | {:>8.3}% | {:>10.1} |",
            e.epoch,
            e.lr_shift,
            e.accuracy.percent(),
            e.elapsed.as_secs_f64()
        );
    }
    println!("+-------+----------+-----------+------------+");
    if !summary.loss_history.is_empty() {
        let avg = summary.loss_history.iter().sum::<f64>() / summary.loss_history.len() as f64;
        println!("mean logged loss: {:.6} over {} records", avg, summary.loss_history.len());
    }
}
