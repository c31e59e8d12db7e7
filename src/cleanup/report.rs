/// Log the outcome of one deletion pass.
pub fn show_stats(kind: &str, count: usize, errors: &[String]) {
    tracing::info!("[{}] {} resources deleted", kind, count);
    if !errors.is_empty() {
        tracing::error!("{} errors occurred: {}", errors.len(), errors.join("; "));
    }
}
