use async_trait::async_trait;
use std::path::PathBuf;

use super::{Regime, RegimeObservation, RegimeSource, RegimeSourceKind};
use crate::data::{clamp01, normalize_date, parse_number, read_source, CsvTable};
use crate::logging::{log, obj, v_str, Domain, Level};

/// Regime-per-date CSV written by the upstream pipeline:
/// `{dir}/{asset}_monthly_regimes.csv`.
pub struct PipelineCsvSource {
    pub dir: PathBuf,
}

impl PipelineCsvSource {
    /// File names tried in order: as given, upper-case, lower-case.
    pub fn candidates(&self, asset: &str) -> Vec<PathBuf> {
        let mut names: Vec<String> = Vec::new();
        for variant in [asset.to_string(), asset.to_uppercase(), asset.to_lowercase()] {
            let name = format!("{}_monthly_regimes.csv", variant);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.into_iter().map(|n| self.dir.join(n)).collect()
    }
}

/// Rows from a regimes table. Quality and entropy are not part of this format
/// and stay at zero.
pub fn parse_regime_table(table: &CsvTable) -> Vec<RegimeObservation> {
    let (Some(date_col), Some(regime_col)) = (table.column("date"), table.column("regime")) else {
        return Vec::new();
    };
    let confidence_col = table.column("confidence");
    let microstate_col = table.column("microstate");

    let mut out: Vec<RegimeObservation> = table
        .rows
        .iter()
        .filter_map(|row| {
            let date = normalize_date(row.get(date_col)?)?;
            let regime = Regime::from_label(row.get(regime_col).map(String::as_str).unwrap_or(""));
            let confidence = table
                .cell(row, confidence_col)
                .and_then(parse_number)
                .map(clamp01)
                .unwrap_or(0.0);
            let microstate = table
                .cell(row, microstate_col)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| regime.as_str().to_string());
            Some(RegimeObservation {
                date,
                regime,
                microstate,
                confidence,
                quality: 0.0,
                entropy: 0.0,
            })
        })
        .collect();
    out.sort_by(|a, b| a.date.cmp(&b.date));
    out
}

#[async_trait]
impl RegimeSource for PipelineCsvSource {
    fn kind(&self) -> RegimeSourceKind {
        RegimeSourceKind::PipelineCsv
    }

    async fn derive(&self, asset: &str, _dates: &[String]) -> Option<Vec<RegimeObservation>> {
        for path in self.candidates(asset) {
            let Ok((text, _)) = read_source(&path).await else {
                continue;
            };
            let rows = parse_regime_table(&CsvTable::parse(&text));
            log(
                Level::Debug,
                Domain::Regime,
                "pipeline_csv_read",
                obj(&[
                    ("asset", v_str(asset)),
                    ("path", v_str(&path.display().to_string())),
                    ("rows", serde_json::json!(rows.len())),
                ]),
            );
            return Some(rows);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_rows_with_missing_confidence_as_zero() {
        let table = CsvTable::parse(
            "Date,REGIME,Confidence\n2020-02,unstable,0.61\n2020-01,STABLE,\n2020-03,Transition,abc\nbad,STABLE,0.9\n2020-04,weird,1.4\n",
        );
        let rows = parse_regime_table(&table);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].date, "2020-01-01");
        assert_eq!(rows[0].regime, Regime::Stable);
        assert_eq!(rows[0].confidence, 0.0);
        assert_eq!(rows[1].regime, Regime::Unstable);
        assert_eq!(rows[1].confidence, 0.61);
        assert_eq!(rows[2].confidence, 0.0);
        assert_eq!(rows[3].regime, Regime::Inconclusive);
        assert_eq!(rows[3].confidence, 1.0);
        assert!(rows.iter().all(|r| r.quality == 0.0 && r.entropy == 0.0));
        assert_eq!(rows[1].microstate, "UNSTABLE");
    }

    #[test]
    fn requires_date_and_regime_columns() {
        let table = CsvTable::parse("date,confidence\n2020-01,0.5\n");
        assert!(parse_regime_table(&table).is_empty());
    }

    #[test]
    fn candidate_names_are_deduplicated() {
        let source = PipelineCsvSource { dir: PathBuf::from("r") };
        assert_eq!(source.candidates("SP").len(), 2);
        assert_eq!(source.candidates("Sao_Paulo").len(), 3);
        assert_eq!(source.candidates("Sao_Paulo")[1], PathBuf::from("r/SAO_PAULO_monthly_regimes.csv"));
    }

    #[tokio::test]
    async fn finds_upper_case_file_variant() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("CURITIBA_monthly_regimes.csv"),
            "date,regime,confidence,microstate\n2021-01,STABLE,0.8,calm\n",
        )
        .unwrap();
        let source = PipelineCsvSource { dir: dir.path().to_path_buf() };
        let rows = source.derive("curitiba", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].microstate, "calm");
        assert!(source.derive("belem", &[]).await.is_none());
    }
}
