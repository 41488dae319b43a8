//___________________________________TESTS____________________________________

#[cfg(test)]
mod tests {
    use crate::symbolic::symbolic_engine::Expr;
    use crate::symbolic::symbolic_functions::Jacobian;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_assign() {
        let mut expr = Expr::Var("x".to_string());
        expr += Expr::Const(2.0);
        let expected = Expr::Add(
            Box::new(Expr::Var("x".to_string())),
            Box::new(Expr::Const(2.0)),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_mul_assign() {
        let mut expr = Expr::Var("x".to_string());
        expr *= Expr::Const(2.0);
        let expected = Expr::Mul(
            Box::new(Expr::Var("x".to_string())),
            Box::new(Expr::Const(2.0)),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_simplify_neutral_elements() {
        let x = Expr::Var("x".to_string());
        assert_eq!((x.clone() + Expr::Const(0.0)).simplify(), x);
        assert_eq!((Expr::Const(1.0) * x.clone()).simplify(), x);
        assert_eq!((Expr::Const(0.0) * x.clone()).simplify(), Expr::Const(0.0));
        assert_eq!(x.clone().pow(Expr::Const(1.0)).simplify(), x);
        assert_eq!((x.clone() - x.clone()).simplify(), Expr::Const(0.0));
        assert_eq!(
            (Expr::Const(2.0) * (Expr::Const(3.0) * x.clone())).simplify(),
            Expr::Mul(Expr::Const(6.0).boxed(), x.boxed())
        );
    }

    #[test]
    fn test_diff_matches_finite_differences() {
        let cases = [
            "x^3*y - 2*x/y",
            "exp(-8750/x)*y",
            "sin(x)*cos(y) + tg(x/3)",
            "ln(x+y^2)",
            "arctg(x*y) + arcsin(x/10) + arccos(y/10)",
            "x^y",
            "sqrt(x*y)",
        ];
        let vars = ["x", "y"];
        let point = [1.3, 0.7];
        let h = 1e-6;
        for case in cases {
            let f = Expr::parse_expression(case).unwrap();
            let f_num = f.lambdify_borrowed_thread_safe(&vars).unwrap();
            for (k, var) in vars.iter().enumerate() {
                let df = f.diff(var).simplify();
                let df_num = df.lambdify_borrowed_thread_safe(&vars).unwrap();
                let mut plus = point;
                let mut minus = point;
                plus[k] += h;
                minus[k] -= h;
                let fd = (f_num(&plus) - f_num(&minus)) / (2.0 * h);
                assert_relative_eq!(df_num(&point), fd, epsilon = 1e-6, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_lambdify_follows_argument_order() {
        let f = Expr::parse_expression("(500-c)^2 + 0.5*(320-T)^2").unwrap();
        let compiled = f.lambdify_borrowed_thread_safe(&["c", "T"]).unwrap();
        assert_relative_eq!(compiled(&[400.0, 300.0]), 10200.0);
        let swapped = f.lambdify_borrowed_thread_safe(&["T", "c"]).unwrap();
        assert_relative_eq!(swapped(&[300.0, 400.0]), 10200.0);
    }

    #[test]
    fn test_lambdify_reports_unknown_variable() {
        let f = Expr::parse_expression("x + z").unwrap();
        let err = f.lambdify_borrowed_thread_safe(&["x", "y"]).err().unwrap();
        assert!(err.contains("'z'"));
    }

    #[test]
    fn test_jacobian_skips_structural_zeros() {
        let f = Expr::parse_vector_expression(&["x*y", "x^2", "3"]).unwrap();
        let mut jac = Jacobian::from_vectors(f, Expr::Symbols("x, y"));
        jac.calc_jacobian();
        assert_eq!(jac.symbolic_jacobian.len(), 3);
        let compiled = jac.jacobian_generate(&["x", "y"]).unwrap();
        assert_eq!(compiled.sparsity_pattern(), vec![(0, 0), (0, 1), (1, 0)]);
        let m = compiled.evaluate_DMatrix(&[2.0, 5.0]);
        assert_relative_eq!(m[(0, 0)], 5.0);
        assert_relative_eq!(m[(0, 1)], 2.0);
        assert_relative_eq!(m[(1, 0)], 4.0);
        assert_relative_eq!(m[(1, 1)], 0.0);
        assert_relative_eq!(m[(2, 0)], 0.0);

        let values = jac
            .lambdify_funcvector(&["x", "y"])
            .unwrap()
            .evaluate_DVector(&[2.0, 5.0]);
        assert_eq!(values.as_slice(), &[10.0, 4.0, 3.0]);
    }
}
