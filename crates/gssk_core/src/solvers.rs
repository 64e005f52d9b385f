use crate::error::{zeroed, Result};
use crate::model::Method;
use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Explicit (forward) Euler solver.
pub struct Euler<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Result<Self> {
        Ok(Self {
            deriv: zeroed(dim, T::zero(), "euler derivative")?,
        })
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(*t, state, &mut self.deriv);
        for (q, dq) in state.iter_mut().zip(&self.deriv) {
            *q = *q + dt * *dq;
        }
        *t = *t + dt;
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    /// Stage buffers are reserved up front so a step never allocates.
    pub fn new(dim: usize) -> Result<Self> {
        Ok(Self {
            k1: zeroed(dim, T::zero(), "rk4 stage k1")?,
            k2: zeroed(dim, T::zero(), "rk4 stage k2")?,
            k3: zeroed(dim, T::zero(), "rk4 stage k3")?,
            k4: zeroed(dim, T::zero(), "rk4 stage k4")?,
            tmp: zeroed(dim, T::zero(), "rk4 stage state")?,
        })
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::lit(0.5);
        let two = T::lit(2.0);
        let sixth = dt / T::lit(6.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * dt * self.k1[i];
        }
        system.apply(t0 + half * dt, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * dt * self.k2[i];
        }
        system.apply(t0 + half * dt, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Integrator selected by the run configuration.
pub enum Integrator {
    Euler(Euler<f64>),
    Rk4(RK4<f64>),
}

impl Integrator {
    pub fn build(method: Method, dim: usize) -> Result<Self> {
        Ok(match method {
            Method::Euler => Integrator::Euler(Euler::new(dim)?),
            Method::Rk4 => Integrator::Rk4(RK4::new(dim)?),
        })
    }

    pub fn method(&self) -> Method {
        match self {
            Integrator::Euler(_) => Method::Euler,
            Integrator::Rk4(_) => Method::Rk4,
        }
    }

    pub fn step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) {
        match self {
            Integrator::Euler(s) => s.step(system, t, state, dt),
            Integrator::Rk4(s) => s.step(system, t, state, dt),
        }
    }
}
