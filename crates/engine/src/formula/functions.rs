// Built-in aggregate functions

use crate::cell::CellStatus;

use super::eval::Scalar;

/// Check if a function name is a known built-in. Names are uppercase, as
/// produced by the parser.
pub fn is_known_function(name: &str) -> bool {
    matches!(
        name,
        "SUM" | "AVG" | "AVERAGE" | "COUNT" | "MIN" | "MAX" | "LEN"
    )
}

/// Apply a built-in to collected scalar operands.
///
/// Numeric aggregates skip text operands (no implicit parsing); COUNT counts
/// only numbers; LEN measures text length (numbers measure their display
/// width). AVG of nothing numeric is a division error, not zero.
pub fn apply(name: &str, values: &[Scalar]) -> Result<f64, CellStatus> {
    match name {
        "SUM" => Ok(numbers(values).sum()),
        "AVG" | "AVERAGE" => {
            let nums: Vec<f64> = numbers(values).collect();
            if nums.is_empty() {
                Err(CellStatus::DivisionByZero)
            } else {
                Ok(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        "COUNT" => Ok(numbers(values).count() as f64),
        "MIN" => Ok(numbers(values).fold(None::<f64>, |acc, n| {
            Some(acc.map_or(n, |a| a.min(n)))
        })
        .unwrap_or(0.0)),
        "MAX" => Ok(numbers(values).fold(None::<f64>, |acc, n| {
            Some(acc.map_or(n, |a| a.max(n)))
        })
        .unwrap_or(0.0)),
        "LEN" => Ok(values
            .iter()
            .map(|v| match v {
                Scalar::Text(s) => s.chars().count() as f64,
                Scalar::Number(n) => display_width(*n),
            })
            .sum()),
        _ => Err(CellStatus::UnresolvedReference),
    }
}

fn numbers<'a>(values: &'a [Scalar]) -> impl Iterator<Item = f64> + 'a {
    values.iter().filter_map(|v| match v {
        Scalar::Number(n) => Some(*n),
        Scalar::Text(_) => None,
    })
}

fn display_width(n: f64) -> f64 {
    let s = if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    };
    s.chars().count() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Scalar> {
        values.iter().map(|n| Scalar::Number(*n)).collect()
    }

    #[test]
    fn test_sum() {
        assert_eq!(apply("SUM", &nums(&[2.0, 4.0, 6.0])), Ok(12.0));
        assert_eq!(apply("SUM", &[]), Ok(0.0));
    }

    #[test]
    fn test_sum_skips_text() {
        let values = vec![
            Scalar::Number(2.0),
            Scalar::Text("note".to_string()),
            Scalar::Number(3.0),
        ];
        assert_eq!(apply("SUM", &values), Ok(5.0));
    }

    #[test]
    fn test_avg() {
        assert_eq!(apply("AVG", &nums(&[2.0, 4.0, 6.0])), Ok(4.0));
        assert_eq!(apply("AVERAGE", &nums(&[2.0, 4.0, 6.0])), Ok(4.0));
    }

    #[test]
    fn test_avg_of_no_numbers_is_division_error() {
        assert_eq!(apply("AVG", &[]), Err(CellStatus::DivisionByZero));
        assert_eq!(
            apply("AVG", &[Scalar::Text("x".to_string())]),
            Err(CellStatus::DivisionByZero)
        );
    }

    #[test]
    fn test_count_counts_numbers_only() {
        let values = vec![
            Scalar::Number(1.0),
            Scalar::Text("a".to_string()),
            Scalar::Number(2.0),
        ];
        assert_eq!(apply("COUNT", &values), Ok(2.0));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(apply("MIN", &nums(&[3.0, -1.0, 2.0])), Ok(-1.0));
        assert_eq!(apply("MAX", &nums(&[3.0, -1.0, 2.0])), Ok(3.0));
        assert_eq!(apply("MIN", &[]), Ok(0.0));
        assert_eq!(apply("MAX", &[]), Ok(0.0));
    }

    #[test]
    fn test_len() {
        assert_eq!(
            apply("LEN", &[Scalar::Text("hello".to_string())]),
            Ok(5.0)
        );
        assert_eq!(apply("LEN", &[Scalar::Number(1234.0)]), Ok(4.0));
        assert_eq!(apply("LEN", &[Scalar::Number(1.5)]), Ok(3.0));
    }

    #[test]
    fn test_known_functions() {
        assert!(is_known_function("SUM"));
        assert!(is_known_function("AVG"));
        assert!(is_known_function("LEN"));
        assert!(!is_known_function("MEDIAN"));
        assert!(!is_known_function("sum")); // parser uppercases
    }
}
