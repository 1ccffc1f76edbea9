/// Indices to keep resident around `selected`, nearest first: the selection,
/// then alternately one step back and one step forward, up to `radius` on
/// each side.
pub fn window_indices(selected: usize, len: usize, radius: usize) -> Vec<usize> {
    if selected >= len {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(2 * radius + 1);
    out.push(selected);
    for step in 1..=radius {
        let bwd = selected.checked_sub(step);
        let fwd = selected.checked_add(step).filter(|&i| i < len);
        if bwd.is_none() && fwd.is_none() {
            break;
        }
        out.extend(bwd);
        out.extend(fwd);
    }
    out
}

/// Filenames that should be resident when `files[selected]` is shown.
///
/// `extra` (usually the image just left) goes first; it may duplicate an
/// entry of the window and the cache treats that as a no-op.
pub fn compute_window(
    files: &[String],
    selected: usize,
    radius: usize,
    extra: Option<&str>,
) -> Vec<String> {
    let mut out = Vec::with_capacity(2 * radius + 2);
    if let Some(name) = extra {
        out.push(name.to_string());
    }
    out.extend(
        window_indices(selected, files.len(), radius)
            .into_iter()
            .map(|i| files[i].clone()),
    );
    out
}
