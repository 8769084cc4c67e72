use crate::math::Matrix;

/// A trainable tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub value: Matrix,
    pub grad: Matrix,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Matrix) -> Param {
        let grad = Matrix::zeros(value.rows, value.cols);
        Param { name: name.into(), value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    pub fn len(&self) -> usize {
        self.value.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.data.is_empty()
    }
}
