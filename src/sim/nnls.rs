use nalgebra::{DMatrix, DVector};

/// Lawson-Hanson active-set non-negative least squares:
/// minimize |A x - b| subject to x >= 0.
///
/// The moment systems this solves are small (tens of columns, ten rows),
/// so the dense active-set method is the right tool. Computation is in
/// f64 throughout; single precision is not enough for the normal-equation
/// style updates on nearly-degenerate candidate sets.
pub fn nnls(a: &DMatrix<f64>, b: &DVector<f64>) -> (DVector<f64>, f64) {
    let n = a.ncols();
    let max_outer = 3 * n + 30;
    let tol = 1e-12;

    let mut x = DVector::<f64>::zeros(n);
    let mut passive = vec![false; n];

    for _ in 0..max_outer {
        // gradient of the residual
        let resid = b - a * &x;
        let w = a.transpose() * &resid;

        // most-violating free variable
        let mut best: Option<(usize, f64)> = None;
        for j in 0..n {
            if !passive[j] && w[j] > tol {
                match best {
                    Some((_, bw)) if bw >= w[j] => {}
                    _ => best = Some((j, w[j])),
                }
            }
        }
        let Some((enter, _)) = best else {
            break;
        };
        passive[enter] = true;

        // inner loop: solve the unconstrained LS on the passive set and
        // back off until that solution is feasible
        loop {
            let z = solve_passive_ls(a, b, &passive);

            let mut alpha = 1.0f64;
            let mut any_negative = false;
            for j in 0..n {
                if passive[j] && z[j] <= tol {
                    any_negative = true;
                    let denom = x[j] - z[j];
                    if denom > 0. {
                        alpha = alpha.min(x[j] / denom);
                    }
                }
            }

            if !any_negative {
                x = z;
                break;
            }

            for j in 0..n {
                if passive[j] {
                    x[j] += alpha * (z[j] - x[j]);
                    if x[j] <= tol {
                        x[j] = 0.;
                        passive[j] = false;
                    }
                }
            }

            if !passive.iter().any(|&p| p) {
                // backed off to an empty set; nothing more to gain
                let resid = (b - a * &x).norm();
                return (x, resid);
            }
        }
    }

    let resid = (b - a * &x).norm();
    (x, resid)
}

/// Least squares over only the passive columns, zeros elsewhere.
fn solve_passive_ls(a: &DMatrix<f64>, b: &DVector<f64>, passive: &[bool]) -> DVector<f64> {
    let cols: Vec<usize> = (0..a.ncols()).filter(|&j| passive[j]).collect();
    let sub = a.select_columns(cols.iter());

    let svd = sub.svd(true, true);
    let zsub = svd.solve(b, 1e-12).expect("SVD solve cannot fail with both factors");

    let mut z = DVector::<f64>::zeros(a.ncols());
    for (k, &j) in cols.iter().enumerate() {
        z[j] = zsub[k];
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_optimum_is_returned_when_nonnegative() {
        // A = I, b = (1, 2): solution is b itself
        let a = DMatrix::<f64>::identity(2, 2);
        let b = DVector::from_vec(vec![1., 2.]);
        let (x, resid) = nnls(&a, &b);
        assert!((x[0] - 1.).abs() < 1e-10);
        assert!((x[1] - 2.).abs() < 1e-10);
        assert!(resid < 1e-10);
    }

    #[test]
    fn negative_components_are_clamped() {
        // A = I, b = (1, -2): constrained optimum is (1, 0)
        let a = DMatrix::<f64>::identity(2, 2);
        let b = DVector::from_vec(vec![1., -2.]);
        let (x, resid) = nnls(&a, &b);
        assert!((x[0] - 1.).abs() < 1e-10);
        assert!(x[1].abs() < 1e-10);
        assert!((resid - 2.).abs() < 1e-9);
    }

    #[test]
    fn solves_a_diffusion_like_moment_system() {
        // 1D three-point stencil at xi = -1, 0, 1, matching moments of a
        // spreading Gaussian: sum w = 1, sum w xi = 0, sum w xi^2 = 0.5
        let a = DMatrix::from_row_slice(3, 3, &[1., 1., 1., -1., 0., 1., 1., 0., 1.]);
        let b = DVector::from_vec(vec![1., 0., 0.5]);
        let (x, resid) = nnls(&a, &b);
        assert!(resid < 1e-10, "residual {}", resid);
        assert!((x[0] - 0.25).abs() < 1e-9);
        assert!((x[1] - 0.5).abs() < 1e-9);
        assert!((x[2] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn reports_infeasibility_through_the_residual() {
        // all candidates on one side: the first moment cannot vanish
        let a = DMatrix::from_row_slice(2, 2, &[1., 1., 1., 2.]);
        let b = DVector::from_vec(vec![1., 0.]);
        let (x, resid) = nnls(&a, &b);
        assert!(x.iter().all(|&v| v >= 0.));
        assert!(resid > 0.3, "expected a visible residual, got {}", resid);
    }
}
