use super::model::{ColumnKind, Dataset};

/// Summary statistics of one numeric column, missing values ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub unit: Option<String>,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1); needs two values.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Describe every float and integer column of the dataset.
pub fn describe(dataset: &Dataset) -> Vec<ColumnSummary> {
    dataset
        .schema
        .columns
        .iter()
        .filter(|c| matches!(c.kind, ColumnKind::Float | ColumnKind::Integer))
        .filter_map(|c| {
            let values: Vec<f64> = dataset.column(&c.name)?.into_iter().flatten().collect();
            Some(summarise(&c.name, c.unit.clone(), &values))
        })
        .collect()
}

fn summarise(name: &str, unit: Option<String>, values: &[f64]) -> ColumnSummary {
    let count = values.len();
    let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
    let std = mean.filter(|_| count > 1).map(|m| {
        let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    });
    ColumnSummary {
        name: name.to_string(),
        unit,
        count,
        mean,
        std,
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
    }
}
