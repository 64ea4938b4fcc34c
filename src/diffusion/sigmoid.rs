//! Fitting of S-shaped diffusion curves through two points.
//!
//! The curve is `share(year) = L / (1 + exp(-steepness * ((year - offset_year) - midpoint)))`,
//! which only ever increases for a positive steepness. Decreasing trajectories are fitted on their
//! mirror image (`L - share`).
//!
//! The midpoint and steepness are found by least squares with a small Levenberg-Marquardt
//! iteration. As this can fail to converge from a poor starting point, the fit is retried from a
//! fixed list of start values and the first acceptable result wins.
use crate::model::SigmoidConfig;
use log::{debug, trace};
use thiserror::Error;

/// Start values tried before the fine-grained ranges
const NICE_START_VALUES: [f64; 10] = [
    1.0, 0.001, 0.01, 0.1, 60.0, 100.0, 200.0, 400.0, 500.0, 1000.0,
];

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING: f64 = 1e15;

/// Smallest value used when scaling the damping term by the diagonal of JᵀJ
const DIAGONAL_FLOOR: f64 = 1e-12;

/// The built-in list of start values.
///
/// Each value is used as both the midpoint and the steepness of the starting point.
pub fn default_start_values() -> Vec<f64> {
    let fine = (0..=100).map(|i| f64::from(i) * 0.05);
    let integers = (1..=58).map(f64::from);
    NICE_START_VALUES
        .into_iter()
        .chain(fine)
        .chain(integers)
        .collect()
}

/// Whether a fitted curve rises or falls over time
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SigmoidDirection {
    /// Share rises towards the L-value
    Increasing,
    /// Share falls away from the L-value
    Decreasing,
}

/// A fitted diffusion curve
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct SigmoidParameters {
    /// Midpoint, in years since `offset_year`
    pub midpoint: f64,
    /// Steepness
    pub steepness: f64,
    /// Asymptotic maximum share
    pub l_value: f64,
    /// Whether the share rises or falls
    pub direction: SigmoidDirection,
    /// The year from which the midpoint is measured
    pub offset_year: u32,
}

impl SigmoidParameters {
    /// Evaluate the curve in the given year
    pub fn evaluate(&self, year: u32) -> f64 {
        let x = f64::from(year) - f64::from(self.offset_year);
        let rising = self.l_value * logistic(self.steepness * (x - self.midpoint));
        match self.direction {
            SigmoidDirection::Increasing => rising,
            SigmoidDirection::Decreasing => self.l_value - rising,
        }
    }
}

/// Logistic function, evaluated without overflow for large |z|
fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Reason for rejecting a single fit attempt
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    /// No step could be found which reduced the residual
    #[error(
        "no improving step found (residual {residual}, midpoint {midpoint}, steepness {steepness})"
    )]
    Stalled {
        /// Sum of squared residuals at the point where progress stopped
        residual: f64,
        /// Midpoint at the point where progress stopped
        midpoint: f64,
        /// Steepness at the point where progress stopped
        steepness: f64,
    },
    /// The iteration limit was reached before the residual fell below the tolerance
    #[error(
        "did not converge (residual {residual}, midpoint {midpoint}, steepness {steepness})"
    )]
    NotConverged {
        /// Sum of squared residuals
        residual: f64,
        /// Last midpoint
        midpoint: f64,
        /// Last steepness
        steepness: f64,
    },
    /// The fitted parameters are outside the accepted range
    #[error("midpoint {midpoint} or steepness {steepness} out of bounds")]
    OutOfBounds {
        /// Fitted midpoint
        midpoint: f64,
        /// Fitted steepness
        steepness: f64,
    },
    /// A fitted parameter is identical to its start value
    #[error("midpoint {midpoint} or steepness {steepness} did not move from the start value")]
    NoProgress {
        /// Fitted midpoint
        midpoint: f64,
        /// Fitted steepness
        steepness: f64,
    },
}

impl FitError {
    /// The (midpoint, steepness) pair which was rejected
    pub fn parameters(&self) -> (f64, f64) {
        match self {
            Self::Stalled {
                midpoint,
                steepness,
                ..
            }
            | Self::NotConverged {
                midpoint,
                steepness,
                ..
            }
            | Self::OutOfBounds {
                midpoint,
                steepness,
            }
            | Self::NoProgress {
                midpoint,
                steepness,
            } => (*midpoint, *steepness),
        }
    }
}

/// Every start value was tried without an acceptable fit
#[derive(Debug, Error, PartialEq)]
#[error("no acceptable fit after {attempts} attempts")]
pub struct FitFailure {
    /// The number of attempts made
    pub attempts: usize,
    /// The last rejected (midpoint, steepness) pair
    pub last_rejected: Option<(f64, f64)>,
}

/// Two data points (x, share), with x in years since the offset year
type Points = [(f64, f64); 2];

/// Fits diffusion curves through two points
pub struct SigmoidFitter<'a> {
    config: &'a SigmoidConfig,
    start_values: Vec<f64>,
}

impl<'a> SigmoidFitter<'a> {
    /// Create a new fitter
    pub fn new(config: &'a SigmoidConfig) -> Self {
        let start_values = config
            .start_values
            .clone()
            .unwrap_or_else(default_start_values);

        Self {
            config,
            start_values,
        }
    }

    /// The number of start values which will be tried before giving up
    pub fn max_attempts(&self) -> usize {
        self.start_values.len()
    }

    /// Fit a curve with the given L-value through the base-year and end-year points.
    ///
    /// Shares are first moved into the range `[epsilon, L - epsilon]`, as the curve can neither
    /// reach zero nor its asymptote.
    ///
    /// # Arguments
    ///
    /// * `l_value` - Maximum share
    /// * `point_by` - Base year and share
    /// * `point_ey` - End year and share
    pub fn fit(
        &self,
        l_value: f64,
        point_by: (u32, f64),
        point_ey: (u32, f64),
    ) -> Result<SigmoidParameters, FitFailure> {
        let epsilon = self.config.share_epsilon;
        let upper = (l_value - epsilon).max(epsilon);
        let to_point = |(year, share): (u32, f64)| {
            (
                f64::from(year) - f64::from(self.config.base_offset_year),
                share.clamp(epsilon, upper),
            )
        };
        let mut points = [to_point(point_by), to_point(point_ey)];

        let direction = if points[1].1 >= points[0].1 {
            SigmoidDirection::Increasing
        } else {
            for point in &mut points {
                point.1 = l_value - point.1;
            }
            SigmoidDirection::Decreasing
        };

        let mut last_rejected = None;
        for (attempt, &start) in self.start_values.iter().enumerate() {
            let result = self
                .attempt_fit(&points, l_value, start)
                .and_then(|fit| self.check_fit(start, fit));
            match result {
                Ok((midpoint, steepness)) => {
                    debug!(
                        "Accepted fit after {} attempt(s) from start value {start}: midpoint \
                        {midpoint}, steepness {steepness}",
                        attempt + 1
                    );
                    return Ok(SigmoidParameters {
                        midpoint,
                        steepness,
                        l_value,
                        direction,
                        offset_year: self.config.base_offset_year,
                    });
                }
                Err(err) => {
                    trace!("Fit from start value {start} rejected: {err}");
                    last_rejected = Some(err.parameters());
                }
            }
        }

        Err(FitFailure {
            attempts: self.start_values.len(),
            last_rejected,
        })
    }

    /// Check a converged fit against the acceptance criteria
    #[allow(clippy::float_cmp)]
    fn check_fit(
        &self,
        start: f64,
        (midpoint, steepness): (f64, f64),
    ) -> Result<(f64, f64), FitError> {
        if !(steepness > 0.0
            && steepness < self.config.max_steepness
            && midpoint > 0.0
            && midpoint < self.config.max_midpoint)
        {
            return Err(FitError::OutOfBounds {
                midpoint,
                steepness,
            });
        }

        if midpoint == start || steepness == start {
            return Err(FitError::NoProgress {
                midpoint,
                steepness,
            });
        }

        Ok((midpoint, steepness))
    }

    /// Run a single least-squares fit, with both parameters starting at `start`.
    ///
    /// Returns the fitted (midpoint, steepness) if the residual fell below the fit tolerance.
    fn attempt_fit(
        &self,
        points: &Points,
        l_value: f64,
        start: f64,
    ) -> Result<(f64, f64), FitError> {
        let mut params = (start, start);
        let mut residual = sum_of_squares(points, l_value, params);
        let mut damping = INITIAL_DAMPING;

        for _ in 0..self.config.max_iterations {
            if residual <= self.config.fit_tolerance {
                break;
            }

            let (jtj, jtr) = normal_equations(points, l_value, params);
            loop {
                if let Some(step) = solve_damped(&jtj, jtr, damping) {
                    let candidate = (params.0 + step.0, params.1 + step.1);
                    let candidate_residual = sum_of_squares(points, l_value, candidate);
                    if candidate_residual < residual {
                        params = candidate;
                        residual = candidate_residual;
                        damping = (damping / 10.0).max(MIN_DAMPING);
                        break;
                    }
                }

                damping *= 10.0;
                if damping > MAX_DAMPING {
                    return Err(FitError::Stalled {
                        residual,
                        midpoint: params.0,
                        steepness: params.1,
                    });
                }
            }
        }

        if residual > self.config.fit_tolerance {
            return Err(FitError::NotConverged {
                residual,
                midpoint: params.0,
                steepness: params.1,
            });
        }

        Ok(params)
    }
}

fn sum_of_squares(points: &Points, l_value: f64, (midpoint, steepness): (f64, f64)) -> f64 {
    points
        .iter()
        .map(|(x, y)| {
            let residual = y - l_value * logistic(steepness * (x - midpoint));
            residual * residual
        })
        .sum()
}

/// Calculate JᵀJ and Jᵀr, where J is the Jacobian with respect to (midpoint, steepness)
fn normal_equations(
    points: &Points,
    l_value: f64,
    (midpoint, steepness): (f64, f64),
) -> ([[f64; 2]; 2], (f64, f64)) {
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = (0.0, 0.0);
    for (x, y) in points {
        let sigma = logistic(steepness * (x - midpoint));
        let slope = l_value * sigma * (1.0 - sigma);
        let d_midpoint = -steepness * slope;
        let d_steepness = (x - midpoint) * slope;
        let residual = y - l_value * sigma;

        jtj[0][0] += d_midpoint * d_midpoint;
        jtj[0][1] += d_midpoint * d_steepness;
        jtj[1][1] += d_steepness * d_steepness;
        jtr.0 += d_midpoint * residual;
        jtr.1 += d_steepness * residual;
    }
    jtj[1][0] = jtj[0][1];

    (jtj, jtr)
}

/// Solve `(JᵀJ + damping * diag(JᵀJ)) step = Jᵀr` for the step
fn solve_damped(jtj: &[[f64; 2]; 2], jtr: (f64, f64), damping: f64) -> Option<(f64, f64)> {
    let a00 = jtj[0][0] + damping * jtj[0][0].max(DIAGONAL_FLOOR);
    let a11 = jtj[1][1] + damping * jtj[1][1].max(DIAGONAL_FLOOR);
    let a01 = jtj[0][1];

    let det = a00 * a11 - a01 * a01;
    if det == 0.0 || !det.is_finite() {
        return None;
    }

    let step = ((a11 * jtr.0 - a01 * jtr.1) / det, (a00 * jtr.1 - a01 * jtr.0) / det);
    (step.0.is_finite() && step.1.is_finite()).then_some(step)
}
