//! Estatísticas de gravidade.
//!
//! Todas as funções devolvem `None` para entrada vazia — o sentinela
//! "indefinido" é distinto de zero e os chamadores precisam tratá-lo assim.

/// Média aritmética das gravidades.
pub fn mean(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    Some(sum as f64 / values.len() as f64)
}

/// Maior gravidade da série.
pub fn max_severity(values: &[u8]) -> Option<u8> {
    values.iter().copied().max()
}

/// Menor gravidade da série.
pub fn min_severity(values: &[u8]) -> Option<u8> {
    values.iter().copied().min()
}

/// Mediana: valor central em tamanho ímpar, média do par central em par.
pub fn median(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let size = sorted.len();
    if size % 2 == 0 {
        Some(f64::from(u16::from(sorted[size / 2 - 1]) + u16::from(sorted[size / 2])) / 2.0)
    } else {
        Some(f64::from(sorted[size / 2]))
    }
}

/// Desvio padrão populacional.
pub fn std_dev(values: &[u8]) -> Option<f64> {
    let avg = mean(values)?;
    let sum_squares: f64 = values
        .iter()
        .map(|&v| (f64::from(v) - avg).powi(2))
        .sum();
    Some((sum_squares / values.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_undefined_not_zero() {
        assert_eq!(mean(&[]), None);
        assert_eq!(max_severity(&[]), None);
        assert_eq!(min_severity(&[]), None);
        assert_eq!(median(&[]), None);
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn test_mean_and_extremes() {
        let values = [9, 9, 8, 2];
        assert_eq!(mean(&values), Some(7.0));
        assert_eq!(max_severity(&values), Some(9));
        assert_eq!(min_severity(&values), Some(2));
    }

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[5, 1, 9]), Some(5.0));
        assert_eq!(median(&[7]), Some(7.0));
    }

    #[test]
    fn test_median_even_length_averages_middle_pair() {
        assert_eq!(median(&[1, 3, 5, 9]), Some(4.0));
        assert_eq!(median(&[2, 4]), Some(3.0));
    }

    #[test]
    fn test_std_dev_population() {
        // Populacional: sqrt(((2-5)^2 + (8-5)^2) / 2) = 3
        assert_eq!(std_dev(&[2, 8]), Some(3.0));
        // Um único valor tem desvio zero, não indefinido.
        assert_eq!(std_dev(&[6]), Some(0.0));
    }
}
