use csv::Writer;
use log::info;
use std::fs::File;
use std::io;
use std::path::Path;

/// Saves a piecewise-constant optimal control solution as CSV.
///
/// One row per shooting node: `t, x_1 .. x_nx, u_1 .. u_nu`. Controls are defined per
/// interval, so row `k` holds the control applied on `[t_k, t_{k+1})` and the control
/// cells of the terminal row are left empty.
pub fn save_trajectories_to_csv(
    path: &Path,
    t_grid: &[f64],
    state_names: &[String],
    states: &[Vec<f64>],
    control_names: &[String],
    controls: &[Vec<f64>],
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = Writer::from_writer(file);

    let mut headers = Vec::with_capacity(1 + state_names.len() + control_names.len());
    headers.push("t".to_string());
    headers.extend(state_names.iter().cloned());
    headers.extend(control_names.iter().cloned());
    writer.write_record(&headers)?;

    for (k, t) in t_grid.iter().enumerate() {
        let mut row = Vec::with_capacity(headers.len());
        row.push(t.to_string());
        row.extend(
            states
                .iter()
                .map(|x| x.get(k).map(|v| v.to_string()).unwrap_or_default()),
        );
        row.extend(
            controls
                .iter()
                .map(|u| u.get(k).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!("trajectories saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_terminal_row_has_empty_controls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("traj.csv");
        save_trajectories_to_csv(
            &path,
            &[0.0, 0.5, 1.0],
            &["x".to_string()],
            &[vec![1.0, 0.8, 0.6]],
            &["u".to_string()],
            &[vec![-1.0, -2.0]],
        )
        .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["t", "x", "u"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][2], "-2");
        assert_eq!(&rows[2][1], "0.6");
        assert_eq!(&rows[2][2], "");
    }
}
