//! Bulirsch-Stoer rational extrapolation with adaptive step control

use crate::physics::math::Scalar;

/// Length of the regularized state vector (8 KS coordinates, 8 momenta, time)
pub const STATE_LEN: usize = 17;

const HALF: usize = STATE_LEN / 2;
const COLUMNS: usize = 7;
const MAX_SUBDIVISIONS: usize = 10;
const MAX_REJECTIONS: u32 = 5;
const ERROR_TARGETS: [Scalar; 5] = [0.0, 0.04, 0.0016, 0.64e-4, 0.256e-5];

/// Right-hand side of a first-order system in the fictitious time.
pub trait Derivatives {
    fn derivatives(&mut self, y: &[Scalar; STATE_LEN], yp: &mut [Scalar; STATE_LEN]);

    /// Weight dividing the per-component error estimate at `y`
    fn time_factor(&self, y: &[Scalar; STATE_LEN]) -> Scalar;
}

/// Outcome of one [`Extrapolator::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Converged,
    /// Step size was rejected too many times; `y` is left unchanged.
    Collapsed,
}

/// Extrapolation table carried between steps
#[derive(Debug, Clone)]
pub struct Extrapolator {
    table: [[Scalar; COLUMNS]; STATE_LEN],
    /// Subdivision weights indexed by table column, 1-based
    d: [Scalar; COLUMNS + 1],
}

impl Default for Extrapolator {
    fn default() -> Self {
        Self {
            table: [[0.0; COLUMNS]; STATE_LEN],
            d: [0.0; COLUMNS + 1],
        }
    }
}

impl Extrapolator {
    /// Advances `y` from `x` by up to `h`, adapting `h` for the next call.
    ///
    /// Runs modified-midpoint sequences of increasing subdivision and
    /// extrapolates them to zero step size until successive estimates agree to
    /// within `eps`. On convergence `x` is advanced and `h` rescaled by the
    /// predicted optimum.
    pub fn step<S: Derivatives>(
        &mut self,
        system: &mut S,
        eps: Scalar,
        h: &mut Scalar,
        x: &mut Scalar,
        y: &mut [Scalar; STATE_LEN],
    ) -> StepOutcome {
        let start = *y;
        let mut dz = [0.0; STATE_LEN];
        let mut dy = [0.0; STATE_LEN];
        let mut yl = [0.0; STATE_LEN];
        let mut ym = [0.0; STATE_LEN];
        system.derivatives(y, &mut dz);

        let mut fy: Scalar = 1.0;
        let mut rejections = 0;

        'attempt: loop {
            let xn = *x + *h;
            let mut alternate = false;
            let mut m: usize = 1;
            let mut jr: usize = 2;
            let mut js: usize = 3;

            for j in 1..=MAX_SUBDIVISIONS {
                if alternate {
                    self.d[2] = 16.0 / 9.0;
                    self.d[4] = 64.0 / 9.0;
                    self.d[6] = 256.0 / 9.0;
                } else {
                    self.d[2] = 2.25;
                    self.d[4] = 9.0;
                    self.d[6] = 36.0;
                }
                let l = if j > COLUMNS {
                    self.d[COLUMNS] = 64.0;
                    COLUMNS
                } else {
                    self.d[j] = (m * m) as Scalar;
                    j
                };

                let mut converged = l > 3;
                m += m;
                let g = *h / m as Scalar;
                let b = g + g;
                m -= 1;

                for i in 0..STATE_LEN {
                    yl[i] = start[i];
                    ym[i] = start[i] + g * dz[i];
                }
                for _ in 0..m {
                    system.derivatives(&ym, &mut dy);
                    for i in 0..STATE_LEN {
                        let u = yl[i] + b * dy[i];
                        yl[i] = ym[i];
                        ym[i] = u;
                    }
                }
                system.derivatives(&ym, &mut dy);
                let tfac = system.time_factor(&ym);

                let first_column = l < 2;
                let skip_error = l > 5;
                let mut fs: Scalar = 0.0;

                for i in 0..STATE_LEN {
                    let mut v = self.table[i][0];
                    let mut c = (ym[i] + yl[i] + g * dy[i]) * 0.5;
                    self.table[i][0] = c;
                    let mut ta = c;

                    if !first_column {
                        let mut w = 0.0;
                        for k in 2..=l {
                            let b1 = self.d[k] * v;
                            let mut denom = b1 - c;
                            w = c - v;
                            let mut u = v;
                            if denom != 0.0 {
                                denom = w / denom;
                                u = c * denom;
                                c = b1 * denom;
                            }
                            v = self.table[i][k - 1];
                            self.table[i][k - 1] = u;
                            ta += u;
                        }

                        // Coordinates are weighted by their momentum's rate and
                        // vice versa; time carries no weight.
                        let weight = if i + HALF < 2 * HALF {
                            dy[i + HALF].abs() / tfac
                        } else if i < 2 * HALF {
                            dy[i - HALF].abs() / tfac
                        } else {
                            0.0
                        };

                        if converged && ((y[i] - ta) * weight).abs() > eps {
                            converged = false;
                        }
                        if !skip_error {
                            fs = fs.max(w.abs() * weight);
                        }
                    }
                    y[i] = ta;
                }

                if fs != 0.0 {
                    let fa = fy;
                    let k = l - 1;
                    fy = (ERROR_TARGETS[k] / fs).powf(1.0 / (l + k) as Scalar);
                    let fa7 = if l == 2 { 0.0 } else { 0.7 * fa };
                    if fa7 <= fy && fy <= 0.7 {
                        *h *= fy;
                        rejections += 1;
                        if rejections > MAX_REJECTIONS {
                            *h = 0.0;
                            *y = start;
                            return StepOutcome::Collapsed;
                        }
                        continue 'attempt;
                    }
                }

                if converged {
                    *x = xn;
                    *h *= fy;
                    return StepOutcome::Converged;
                }

                self.d[3] = 4.0;
                self.d[5] = 16.0;
                alternate = !alternate;
                m = jr;
                jr = js;
                js = m + m;
            }

            *h *= 0.5;
        }
    }
}
