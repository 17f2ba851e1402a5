/*!
# Reading Samples from and Writing Selections to CSV

Loading a headerless numeric CSV of sample points (or gradients) and saving the rows picked by
thinning. Enable via the `csv` feature.
*/

use ndarray::{Array2, ArrayView2};
use std::error::Error;
use std::fs::File;

use csv::{ReaderBuilder, Trim, Writer};

/**
Loads a headerless CSV of floating-point values as an `n × d` array, one point per row.

Every row must have the same number of fields. An empty file yields a `0 × 0` array.

# Examples

```rust
use stein_thinning::io::csv::load_csv;

std::fs::write("/tmp/stein_sample.csv", "1.0,2.0\n3.5,-4.0\n")?;
let sample = load_csv("/tmp/stein_sample.csv")?;
assert_eq!(sample.dim(), (2, 2));
assert_eq!(sample[[1, 1]], -4.0);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn load_csv(filename: &str) -> Result<Array2<f64>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_path(filename)?;

    let mut values: Vec<f64> = Vec::new();
    let mut n_rows = 0;
    let mut n_cols = 0;
    for record in rdr.records() {
        let record = record?;
        if n_rows == 0 {
            n_cols = record.len();
        }
        for field in record.iter() {
            let v: f64 = field
                .parse()
                .map_err(|e| format!("row {n_rows}: cannot parse {field:?} as a number: {e}"))?;
            values.push(v);
        }
        n_rows += 1;
    }
    Ok(Array2::from_shape_vec((n_rows, n_cols), values)?)
}

/**
Saves the rows of `sample` picked by `indices`, in selection order.

The CSV has a header `index,dim_0,dim_1,...`; each following row holds the selected row index
and that row's coordinates. Repeated indices are written once per occurrence.

# Examples

```rust
use ndarray::array;
use stein_thinning::io::csv::save_selection;

let sample = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]];
save_selection(sample.view(), &[2, 0], "/tmp/stein_selection.csv")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_selection(
    sample: ArrayView2<f64>,
    indices: &[usize],
    filename: &str,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);

    let mut header = vec!["index".to_string()];
    header.extend((0..sample.ncols()).map(|i| format!("dim_{}", i)));
    wtr.write_record(&header)?;

    for &idx in indices {
        if idx >= sample.nrows() {
            return Err(format!(
                "index {idx} out of bounds for a sample of {} rows",
                sample.nrows()
            )
            .into());
        }
        let mut row = vec![idx.to_string()];
        row.extend(sample.row(idx).iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_csv_roundtrip_values() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();
        fs::write(filename, "0.5, -1.25\n3,4e-2\n").unwrap();

        let sample = load_csv(filename).unwrap();
        assert_eq!(sample, array![[0.5, -1.25], [3.0, 0.04]]);
    }

    #[test]
    fn test_load_csv_empty_file() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        let sample = load_csv(filename).unwrap();
        assert_eq!(sample.dim(), (0, 0));
    }

    #[test]
    fn test_load_csv_ragged_rows_fail() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();
        fs::write(filename, "1,2\n3\n").unwrap();

        assert!(load_csv(filename).is_err());
    }

    #[test]
    fn test_load_csv_non_numeric_fails() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();
        fs::write(filename, "1,abc\n").unwrap();

        let err = load_csv(filename).unwrap_err();
        assert!(err.to_string().contains("abc"), "unexpected error: {err}");
    }

    #[test]
    fn test_save_selection_contents() {
        let sample = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.5]];
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        save_selection(sample.view(), &[2, 0, 2], filename).unwrap();

        let contents = fs::read_to_string(filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["index,dim_0,dim_1", "2,4,5.5", "0,0,1", "2,4,5.5"]);
    }

    #[test]
    fn test_save_selection_out_of_bounds() {
        let sample = array![[0.0], [1.0]];
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        assert!(save_selection(sample.view(), &[0, 2], filename).is_err());
    }
}
